use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::db_utils::connection_manager::{open_in_memory_pool, open_pool};
use crate::error::AppError;
use crate::models::{
    DownloadStatus, MousId, SelfcalStatus, SplitStatus, SpwRemap, Stage, StatusColumn, TargetImport, UnitImport,
};

const U1: &str = "uid://A001/X1/X1";

fn unit(id: &str, url: Option<&str>) -> UnitImport {
    UnitImport {
        mous_id: id.to_string(),
        num_asdms: Some(1),
        asdm_paths: vec![],
        download_url: url.map(str::to_string),
        preferred_datacolumn: None,
        targets: vec![
            TargetImport {
                alma_source_name: "IRAS4A".to_string(),
                obs_id: format!("{}.source.IRAS4A.spw.16", id),
                asdm_uid: None,
            },
            TargetImport {
                alma_source_name: "IRAS4A".to_string(),
                obs_id: format!("{}.source.IRAS4A.spw.18", id),
                asdm_uid: None,
            },
        ],
    }
}

async fn repo_with(units: &[UnitImport]) -> PipelineStateRepository {
    let pool = open_in_memory_pool().await.unwrap();
    let repo = PipelineStateRepository::new(Arc::new(pool));
    repo.register_units(units).await.unwrap();
    repo
}

fn id(raw: &str) -> MousId {
    MousId::parse(raw).unwrap()
}

#[tokio::test]
async fn test_registered_units_start_pending() {
    let repo = repo_with(&[unit(U1, Some("http://x"))]).await;

    let record = repo.get_record(&id("uid___A001_X1_X1")).await.unwrap();
    assert_eq!(record.mous_id, U1);
    assert_eq!(record.download_status, Some(DownloadStatus::Pending));
    assert_eq!(record.pre_selfcal_split_status, Some(SplitStatus::Pending));
    assert_eq!(record.selfcal_status, Some(SelfcalStatus::Pending));
    assert_eq!(record.download_url.as_deref(), Some("http://x"));
    assert_eq!(repo.get_targets(&id(U1)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_reimport_does_not_duplicate() {
    let repo = repo_with(&[unit(U1, None)]).await;
    let created = repo.register_units(&[unit(U1, None), unit("uid://A001/X1/X2", None)]).await.unwrap();

    assert_eq!(created, 1);
    assert_eq!(repo.list_records().await.unwrap().len(), 2);
    assert_eq!(repo.get_targets(&id(U1)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_import_id_rolls_nothing_in() {
    let repo = repo_with(&[]).await;
    let err = repo.register_units(&[unit(U1, None), unit("not-an-id", None)]).await.unwrap_err();

    assert!(matches!(err, AppError::InvalidMousId(_)));
    assert!(repo.list_records().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_unit_is_not_found() {
    let repo = repo_with(&[]).await;
    assert!(matches!(repo.get_record(&id(U1)).await, Err(AppError::NotFoundError(_))));
    assert!(matches!(repo.get_spw_remap(&id(U1)).await, Err(AppError::NotFoundError(_))));
    assert!(matches!(
        repo.claim_stage(&id(U1), Stage::Download).await,
        Err(AppError::NotFoundError(_))
    ));
}

#[tokio::test]
async fn test_claim_is_compare_and_swap() {
    let repo = repo_with(&[unit(U1, Some("http://x"))]).await;
    let u1 = id(U1);

    let claim = repo.claim_stage(&u1, Stage::Download).await.unwrap();
    assert!(claim.is_some());
    assert_eq!(repo.claim_stage(&u1, Stage::Download).await.unwrap(), None);

    let record = repo.get_record(&u1).await.unwrap();
    assert_eq!(record.download_status, Some(DownloadStatus::InProgress));
    assert_eq!(record.download_started_at, claim);
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let tmp = tempfile::TempDir::new().unwrap();
    let pool = open_pool(&tmp.path().join("state.db")).await.unwrap();
    let repo = PipelineStateRepository::new(Arc::new(pool));
    repo.register_units(&[unit(U1, Some("http://x"))]).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move { repo.claim_stage(&id(U1), Stage::Download).await }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_complete_requires_live_claim() {
    let repo = repo_with(&[unit(U1, Some("http://x"))]).await;
    let u1 = id(U1);

    assert!(!repo.complete_stage(&u1, Stage::Download, "2024-01-01T00:00:00.000000Z", None).await.unwrap());
    assert_eq!(
        repo.get_record(&u1).await.unwrap().download_status,
        Some(DownloadStatus::Pending)
    );

    let claim = repo.claim_stage(&u1, Stage::Download).await.unwrap().unwrap();
    assert!(!repo.complete_stage(&u1, Stage::Download, "2024-01-01T00:00:00.000000Z", None).await.unwrap());
    assert!(repo.complete_stage(&u1, Stage::Download, &claim, Some("fetched")).await.unwrap());

    let record = repo.get_record(&u1).await.unwrap();
    assert_eq!(record.download_status, Some(DownloadStatus::Downloaded));
    assert_eq!(record.download_notes.as_deref(), Some("fetched"));
    assert!(record.download_completed_at.is_some());
}

#[tokio::test]
async fn test_fail_overwrites_notes_and_requeue_resets() {
    let repo = repo_with(&[unit(U1, Some("http://x"))]).await;
    let u1 = id(U1);

    let claim = repo.claim_stage(&u1, Stage::Download).await.unwrap().unwrap();
    assert!(repo.fail_stage(&u1, Stage::Download, &claim, "first").await.unwrap());
    // the attempt is over; a second terminal write is dropped
    assert!(!repo.fail_stage(&u1, Stage::Download, &claim, "second").await.unwrap());

    let record = repo.get_record(&u1).await.unwrap();
    assert_eq!(record.download_status, Some(DownloadStatus::Error));
    assert_eq!(record.download_notes.as_deref(), Some("first"));

    // errored columns are never reclaimed
    assert_eq!(repo.claim_stage(&u1, Stage::Download).await.unwrap(), None);

    assert!(repo.requeue(&u1, StatusColumn::Download, None).await.unwrap());
    let record = repo.get_record(&u1).await.unwrap();
    assert_eq!(record.download_status, Some(DownloadStatus::Pending));
    assert!(record.download_started_at.is_none());

    // only errored columns are requeued
    assert!(!repo.requeue(&u1, StatusColumn::Download, None).await.unwrap());
}

#[tokio::test]
async fn test_requeue_to_explicit_label() {
    let repo = repo_with(&[unit(U1, None)]).await;
    let u1 = id(U1);
    let claim = repo.claim_status(&u1, StatusColumn::Selfcal, "pending").await.unwrap().unwrap();
    assert!(repo.fail_status(&u1, StatusColumn::Selfcal, &claim, "boom").await.unwrap());

    assert!(matches!(
        repo.requeue(&u1, StatusColumn::Selfcal, Some("in_progress")).await,
        Err(AppError::ValidationError(_))
    ));
    assert!(matches!(
        repo.requeue(&u1, StatusColumn::Selfcal, Some("split")).await,
        Err(AppError::ValidationError(_))
    ));
    assert!(repo.requeue(&u1, StatusColumn::Selfcal, Some("prepped")).await.unwrap());
    assert_eq!(
        repo.get_record(&u1).await.unwrap().selfcal_status,
        Some(SelfcalStatus::Prepped)
    );
}

#[tokio::test]
async fn test_legacy_aliases_are_read_and_claimable() {
    let repo = repo_with(&[unit(U1, None)]).await;
    let u1 = id(U1);
    sqlx::query("UPDATE pipeline_state SET download_status = 'done', pre_selfcal_split_status = 'Pending', selfcal_status = 'weird' WHERE mous_id = $1")
        .bind(U1)
        .execute(&*repo.get_pool())
        .await
        .unwrap();

    let record = repo.get_record(&u1).await.unwrap();
    assert_eq!(record.download_status, Some(DownloadStatus::Complete));
    assert_eq!(record.selfcal_status, None);

    assert!(repo.claim_stage(&u1, Stage::Split).await.unwrap().is_some());
    assert_eq!(repo.claim_stage(&u1, Stage::SelfcalPrep).await.unwrap(), None);
}

#[tokio::test]
async fn test_stale_attempts_expire_to_error() {
    let repo = repo_with(&[unit(U1, Some("http://x")), unit("uid://A001/X1/X2", Some("http://y"))]).await;
    let u1 = id(U1);
    let u2 = id("uid://A001/X1/X2");

    repo.claim_stage(&u1, Stage::Download).await.unwrap();
    repo.claim_stage(&u2, Stage::Download).await.unwrap();
    repo.set_started_at(&u1, StatusColumn::Download, "2020-01-01T00:00:00Z").await.unwrap();

    let expired = repo.expire_stale(Duration::from_secs(3600)).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].mous_id, U1);

    let record = repo.get_record(&u1).await.unwrap();
    assert_eq!(record.download_status, Some(DownloadStatus::Error));
    assert!(record.download_notes.unwrap().starts_with("expired"));
    assert_eq!(
        repo.get_record(&u2).await.unwrap().download_status,
        Some(DownloadStatus::InProgress)
    );
}

#[tokio::test]
async fn test_expiry_skips_reclaimed_attempt() {
    let repo = repo_with(&[unit(U1, Some("http://x"))]).await;
    let u1 = id(U1);
    repo.claim_stage(&u1, Stage::Download).await.unwrap();
    repo.set_started_at(&u1, StatusColumn::Download, "2020-01-01T00:00:00Z").await.unwrap();

    let records = repo.list_records().await.unwrap();
    let attempts = find_stale_attempts(&records, Duration::from_secs(60));
    assert_eq!(attempts.len(), 1);

    // the attempt restarts between the scan and the expiry
    repo.set_started_at(&u1, StatusColumn::Download, "2030-01-01T00:00:00Z").await.unwrap();
    assert!(!repo.expire_attempt(&attempts[0], Duration::from_secs(60)).await.unwrap());
}

#[tokio::test]
async fn test_expired_attempt_cannot_overwrite_its_successor() {
    let repo = repo_with(&[unit(U1, Some("http://x"))]).await;
    let u1 = id(U1);
    let first = repo.claim_stage(&u1, Stage::Download).await.unwrap().unwrap();

    repo.set_started_at(&u1, StatusColumn::Download, "2020-01-01T00:00:00Z").await.unwrap();
    assert_eq!(repo.expire_stale(Duration::from_secs(3600)).await.unwrap().len(), 1);
    assert!(repo.requeue(&u1, StatusColumn::Download, None).await.unwrap());
    let second = repo.claim_stage(&u1, Stage::Download).await.unwrap().unwrap();
    assert_ne!(first, second);

    // the first executor finishes late
    assert!(!repo.complete_stage(&u1, Stage::Download, &first, Some("attempt 1")).await.unwrap());
    assert!(!repo.fail_stage(&u1, Stage::Download, &first, "attempt 1 failed").await.unwrap());

    let record = repo.get_record(&u1).await.unwrap();
    assert_eq!(record.download_status, Some(DownloadStatus::InProgress));
    assert_eq!(record.download_started_at.as_deref(), Some(second.as_str()));
    assert_eq!(record.download_notes, None);

    assert!(repo.complete_stage(&u1, Stage::Download, &second, Some("attempt 2")).await.unwrap());
    let record = repo.get_record(&u1).await.unwrap();
    assert_eq!(record.download_status, Some(DownloadStatus::Downloaded));
    assert_eq!(record.download_notes.as_deref(), Some("attempt 2"));
}

#[tokio::test]
async fn test_spw_remap_round_trip_and_mapping() {
    let repo = repo_with(&[unit(U1, None)]).await;
    let u1 = id(U1);

    assert_eq!(repo.get_spw_remap(&u1).await.unwrap(), None);
    let mapping = repo.get_spw_mapping(&u1).await.unwrap();
    assert_eq!(mapping["IRAS4A"], BTreeSet::from([16, 18]));

    repo.set_spw_remap(&u1, &SpwRemap::from([(16, 0), (18, 1)])).await.unwrap();
    assert_eq!(repo.get_spw_remap(&u1).await.unwrap(), Some(SpwRemap::from([(16, 0), (18, 1)])));
    let mapping = repo.get_spw_mapping(&u1).await.unwrap();
    assert_eq!(mapping["IRAS4A"], BTreeSet::from([0, 1]));

    repo.set_spw_remap(&u1, &SpwRemap::new()).await.unwrap();
    assert_eq!(repo.get_spw_remap(&u1).await.unwrap(), None);
}

#[tokio::test]
async fn test_string_valued_remap_from_older_tools() {
    let repo = repo_with(&[unit(U1, None)]).await;
    sqlx::query("UPDATE pipeline_state SET raw_data_spectral_remap = $1 WHERE mous_id = $2")
        .bind(r#"{"16":"0","18":"1"}"#)
        .bind(U1)
        .execute(&*repo.get_pool())
        .await
        .unwrap();

    let mapping = repo.get_spw_mapping(&id(U1)).await.unwrap();
    assert_eq!(mapping["IRAS4A"], BTreeSet::from([0, 1]));
}

#[tokio::test]
async fn test_malformed_remap_propagates() {
    let repo = repo_with(&[unit(U1, None)]).await;
    sqlx::query("UPDATE pipeline_state SET raw_data_spectral_remap = '{16: 0' WHERE mous_id = $1")
        .bind(U1)
        .execute(&*repo.get_pool())
        .await
        .unwrap();

    assert!(matches!(repo.get_spw_remap(&id(U1)).await, Err(AppError::MalformedRemap(_))));
    assert!(matches!(repo.get_spw_mapping(&id(U1)).await, Err(AppError::MalformedRemap(_))));
}

#[tokio::test]
async fn test_metadata_setters_and_legacy_mirror() {
    let repo = repo_with(&[unit(U1, None)]).await;
    let u1 = id(U1);

    repo.set_download_url(&u1, "https://archive/x").await.unwrap();
    repo.set_mous_directory(&u1, "/arc/datasets/uid___A001_X1_X1").await.unwrap();
    repo.set_calibrated_products(&u1, &["/arc/a.ms".to_string()]).await.unwrap();
    repo.set_split_products(&u1, &["/arc/a_targets.ms".to_string()]).await.unwrap();
    repo.set_preferred_datacolumn(&u1, Some("corrected")).await.unwrap();
    repo.mirror_download(&u1, "yes", Some("/arc/datasets/uid___A001_X1_X1"), None).await.unwrap();
    repo.mirror_split(&u1, "complete", &["/arc/a_targets.ms".to_string()], None).await.unwrap();

    let record = repo.get_record(&u1).await.unwrap();
    assert_eq!(record.download_url.as_deref(), Some("https://archive/x"));
    assert_eq!(record.calibrated_products, vec!["/arc/a.ms".to_string()]);
    assert_eq!(record.split_products_path, vec!["/arc/a_targets.ms".to_string()]);
    assert_eq!(record.preferred_datacolumn.as_deref(), Some("corrected"));

    let legacy = repo.get_mous_record(&u1).await.unwrap();
    assert_eq!(legacy.download_url.as_deref(), Some("https://archive/x"));
    assert_eq!(legacy.downloaded.as_deref(), Some("yes"));
    assert_eq!(legacy.split_status.as_deref(), Some("complete"));
    assert_eq!(legacy.split_products, vec!["/arc/a_targets.ms".to_string()]);
    assert!(legacy.split_date.is_some());
}

#[tokio::test]
async fn test_status_counts_group_by_canonical_label() {
    let repo = repo_with(&[unit(U1, None), unit("uid://A001/X1/X2", None)]).await;
    sqlx::query("UPDATE pipeline_state SET download_status = 'done' WHERE mous_id = $1")
        .bind(U1)
        .execute(&*repo.get_pool())
        .await
        .unwrap();

    let counts = repo.status_counts().await.unwrap();
    let (column, download) = &counts[0];
    assert_eq!(*column, StatusColumn::Download);
    assert_eq!(download.get("complete"), Some(&1));
    assert_eq!(download.get("pending"), Some(&1));
}
