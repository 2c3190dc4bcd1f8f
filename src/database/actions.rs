mod annotate;
mod ingredients;
mod recipes;
mod relations;
mod shopping;
mod tags;
mod users;

pub use annotate::*;
pub use ingredients::*;
pub use recipes::*;
pub use relations::*;
pub use shopping::*;
pub use tags::*;
pub use users::*;
