pub mod api_clients;
pub mod config;
pub mod constants;
pub mod db_utils;
pub mod error;
pub mod jobs;
pub mod models;
pub mod utils;

pub use config::PipelineConfig;
pub use error::{AppError, AppResult};
