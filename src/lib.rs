mod database {
    pub mod actions;
    pub mod composition;
    pub mod error;
    pub mod filter;
    pub mod form;
    pub mod reply;
    pub mod schema;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
}
mod config;
mod constants;

pub use authentication::*;
pub use config::*;
pub use constants::*;
pub use database::*;
