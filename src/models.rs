pub mod mous_id;
pub mod records;
pub mod remote_job;
pub mod stage;
pub mod status;

pub use mous_id::{MousId, to_database_form, to_filesystem_form};
pub use records::{MousRecord, PipelineStateRecord, SpwRemap, TargetImport, TargetRecord, UnitImport};
pub use remote_job::RemoteJobStatus;
pub use stage::Stage;
pub use status::{DownloadStatus, ListobsStatus, SelfcalStatus, SplitStatus, StatusColumn};
