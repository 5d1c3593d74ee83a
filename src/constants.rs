pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const MIN_AMOUNT: i32 = 1;
pub const MAX_AMOUNT: i32 = 32000;

pub const MIN_COOKING_TIME: i32 = 1;
pub const MAX_COOKING_TIME: i32 = 32000;

pub const RECIPE_NAME_MAX_LENGTH: usize = 256;

pub const SHORT_CODE_LENGTH: usize = 6;
pub const SHORT_CODE_ATTEMPTS: usize = 10;
pub const SHORT_CODE_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const SHOPPING_LIST_HEADER: &str = "Shopping list";

pub const RECIPE_IMAGE_FOLDER: &str = "recipes";
pub const AVATAR_IMAGE_FOLDER: &str = "avatars";

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
