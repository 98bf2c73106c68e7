pub mod download_processor;
pub mod listobs_processor;
pub mod post_download_organize_processor;
pub mod post_selfcal_cleanup_processor;
pub mod post_split_organize_processor;
pub mod selfcal_prep_processor;
pub mod selfcal_processor;
pub mod split_processor;
pub mod utils;

pub use download_processor::DownloadProcessor;
pub use listobs_processor::ListobsProcessor;
pub use post_download_organize_processor::PostDownloadOrganizeProcessor;
pub use post_selfcal_cleanup_processor::{PostSelfcalCleanupProcessor, cleanup_selfcal_dir};
pub use post_split_organize_processor::PostSplitOrganizeProcessor;
pub use selfcal_prep_processor::SelfcalPrepProcessor;
pub use selfcal_processor::SelfcalProcessor;
pub use split_processor::SplitProcessor;
