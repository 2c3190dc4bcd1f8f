pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const USER_COUNT_PER_PAGE: i64 = 6;

pub const MIN_COOKING_TIME: i32 = 1;
pub const MAX_COOKING_TIME: i32 = 1440;

pub const MIN_INGREDIENT_AMOUNT: i32 = 1;
pub const MAX_INGREDIENT_AMOUNT: i32 = 10000;

pub const MAX_RECIPE_NAME_LENGTH: usize = 256;
pub const MAX_TAG_LENGTH: usize = 32;
pub const MAX_SLUG_LENGTH: usize = 32;
pub const MAX_INGREDIENT_NAME_LENGTH: usize = 150;
pub const MAX_UNIT_LENGTH: usize = 64;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MAX_NAME_LENGTH: usize = 150;

pub const SHOPPING_LIST_HEADER: &str = "Shopping list";
pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";

pub const SESSION_COOKIE: &str = "session";
pub const SHORT_LINK_PREFIX: &str = "s";
