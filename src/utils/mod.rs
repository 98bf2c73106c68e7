pub mod date_utils;
pub mod env_utils;
pub mod fs_utils;
pub mod path_utils;

pub use date_utils::now_rfc3339;
pub use env_utils::{read_env, read_env_bool, read_env_i32_list, read_env_opt, read_env_u64};
pub use path_utils::{PathNamespaces, product_stem, sanitize_filename};
