pub mod client_trait;
pub mod session_client;
pub mod wget2_fetcher;

pub use client_trait::{ArchiveFetcher, JobRequest, SessionClient};
pub use session_client::HttpSessionClient;
pub use wget2_fetcher::Wget2Fetcher;
