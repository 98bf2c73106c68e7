use async_trait::async_trait;
use log::info;

use crate::api_clients::JobRequest;
use crate::config::PipelineConfig;
use crate::constants::AUTO_SELFCAL_DIR_NAME;
use crate::error::{AppError, AppResult};
use crate::jobs::executor::{StageContext, StageOutcome, StageProcessor};
use crate::jobs::processors::utils::UnitDir;
use crate::jobs::validators::validate_selfcal;
use crate::models::{MousId, PipelineStateRecord, Stage};
use crate::utils::date_utils::job_name_stamp;

/// Runs auto_selfcal on the prepared working directory.
pub struct SelfcalProcessor;

/// Session request for a self-calibration run.
///
/// With a fixed session the platform is asked for the configured cores and
/// memory, and the script is told the same figures.
pub fn selfcal_request(config: &PipelineConfig, mous_id: &MousId, unit: &UnitDir) -> JobRequest {
    let script = if config.fixed_selfcal_session {
        &config.scripts.selfcal_fixed
    } else {
        &config.scripts.selfcal_flexible
    };

    let mut args = vec![
        mous_id.database_form(),
        config.storage_db_path(),
        unit.storage_child(&format!("{}_autoselfcal_terminal", unit.fs_id)),
        config.storage_script(&config.scripts.auto_selfcal_entry),
        unit.storage_child(AUTO_SELFCAL_DIR_NAME),
    ];

    if config.fixed_selfcal_session {
        args.push(config.selfcal_cores.to_string());
        args.push(config.selfcal_ram_gb.to_string());
    }

    let request = JobRequest::new(
        format!("casa-{}-autoselfcal", job_name_stamp()),
        config.casa_pipeline_image.clone(),
        config.storage_script(script),
        args,
    );

    if config.fixed_selfcal_session {
        request.with_resources(config.selfcal_cores, config.selfcal_ram_gb)
    } else {
        request
    }
}

#[async_trait]
impl StageProcessor for SelfcalProcessor {
    fn stage(&self) -> Stage {
        Stage::Selfcal
    }

    async fn process(
        &self,
        ctx: &StageContext,
        mous_id: &MousId,
        record: &PipelineStateRecord,
    ) -> AppResult<StageOutcome> {
        validate_selfcal(record)?;
        let config = &ctx.config;
        let unit = UnitDir::from_record(config, mous_id, record)?;

        let workdir = unit.execution_child(AUTO_SELFCAL_DIR_NAME);
        if !workdir.is_dir() {
            return Err(AppError::FileSystemError(format!(
                "auto_selfcal directory does not exist: {}",
                workdir.display()
            )));
        }

        let request = selfcal_request(config, mous_id, &unit);
        info!(
            "[{}] Launching self-calibration ({})",
            mous_id,
            match request.cores {
                Some(cores) => format!("{} cores, {} GB", cores, request.ram_gb.unwrap_or_default()),
                None => "flexible resources".to_string(),
            }
        );
        let job_id = ctx.run_remote_job(mous_id, &request).await?;

        Ok(StageOutcome::from_job(job_id, "self-calibration finished"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::path_utils::PathNamespaces;

    #[test]
    fn test_fixed_and_flexible_requests() {
        let mut config = PipelineConfig::for_project_root("/mnt/vm/p");
        config.namespaces = PathNamespaces::new("/mnt/vm/p", "/arc/p");
        let mous = MousId::parse("uid://A001/X1/X2").unwrap();
        let unit = UnitDir::from_storage(&config, &mous, "/arc/p/datasets/uid___A001_X1_X2");

        let fixed = selfcal_request(&config, &mous, &unit);
        assert_eq!(fixed.cores, Some(4));
        assert_eq!(fixed.ram_gb, Some(32));
        assert_eq!(fixed.args.len(), 7);
        assert_eq!(fixed.args[3], "/arc/p/auto_selfcal/bin/auto_selfcal.py");
        assert_eq!(fixed.args[4], "/arc/p/datasets/uid___A001_X1_X2/auto_selfcal");
        assert!(fixed.command.ends_with("run_autoselfcal_fixed.sh"));

        config.fixed_selfcal_session = false;
        let flexible = selfcal_request(&config, &mous, &unit);
        assert!(flexible.cores.is_none());
        assert_eq!(flexible.args.len(), 5);
        assert!(flexible.command.ends_with("run_autoselfcal_flexible.sh"));
    }
}
