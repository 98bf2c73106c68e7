mod base;
mod helpers;
mod import;
mod metadata;
mod queries;
mod stale;
mod status;

pub use base::PipelineStateRepository;
pub use metadata::{compute_spw_mapping, parse_spw_remap};
pub use queries::MISSING_LABEL;
pub use stale::{StaleAttempt, find_stale_attempts};

#[cfg(test)]
mod tests;
