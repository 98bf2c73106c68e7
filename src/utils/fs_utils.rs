use glob::Pattern;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::{DATA_PRODUCT_SUFFIX, REPORT_BUNDLE_DIR_NAME};
use crate::error::{AppError, AppResult};

/// Directories found under a staging area, split into the two buckets the
/// organize stages care about. Both lists are sorted and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredArtifacts {
    pub data_products: Vec<PathBuf>,
    pub report_bundles: Vec<PathBuf>,
}

/// Where the discovered artifacts ended up after [`organize_artifacts`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizedArtifacts {
    pub data_products: Vec<PathBuf>,
    pub report_bundles: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub kept: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// Recursively classify subdirectories of `staging_dir`.
///
/// Directories named `*.ms` are data products and directories named
/// `weblog_restore` are report bundles. Traversal never descends into a
/// classified directory, so nested matches inside a product are ignored.
pub fn discover_artifacts(staging_dir: &Path) -> AppResult<DiscoveredArtifacts> {
    if !staging_dir.is_dir() {
        return Err(AppError::FileSystemError(format!(
            "Staging directory does not exist: {}",
            staging_dir.display()
        )));
    }

    let mut data_products = BTreeSet::new();
    let mut report_bundles = BTreeSet::new();

    let mut walker = WalkDir::new(staging_dir).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if name.ends_with(DATA_PRODUCT_SUFFIX) {
            data_products.insert(entry.path().to_path_buf());
            walker.skip_current_dir();
        } else if name == REPORT_BUNDLE_DIR_NAME {
            report_bundles.insert(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }

    Ok(DiscoveredArtifacts {
        data_products: data_products.into_iter().collect(),
        report_bundles: report_bundles.into_iter().collect(),
    })
}

/// Discover artifacts under `staging_dir` and move them into their destination roots.
///
/// Both roots are created up front even when a bucket turns out empty. An
/// empty bucket is logged as a warning only.
pub fn organize_artifacts(
    label: &str,
    staging_dir: &Path,
    data_dest_root: &Path,
    report_dest_root: &Path,
) -> AppResult<OrganizedArtifacts> {
    info!("[{}] Starting organization of staged files in {}", label, staging_dir.display());

    let discovered = discover_artifacts(staging_dir)?;
    info!(
        "[{}] Found {} data products and {} report bundles",
        label,
        discovered.data_products.len(),
        discovered.report_bundles.len()
    );

    info!("[{}] Creating destination root directory: {}", label, data_dest_root.display());
    fs::create_dir_all(data_dest_root)?;
    info!("[{}] Creating report destination root directory: {}", label, report_dest_root.display());
    fs::create_dir_all(report_dest_root)?;

    let mut organized = OrganizedArtifacts::default();

    if discovered.data_products.is_empty() {
        warn!("[{}] No {} directories found.", label, DATA_PRODUCT_SUFFIX);
    }
    for product in &discovered.data_products {
        let dest = unique_destination(data_dest_root, product)?;
        move_item(product, &dest)?;
        organized.data_products.push(dest);
    }
    if !organized.data_products.is_empty() {
        info!(
            "[{}] Moved {} {} -> {}",
            label,
            organized.data_products.len(),
            DATA_PRODUCT_SUFFIX,
            data_dest_root.display()
        );
    }

    if discovered.report_bundles.is_empty() {
        warn!("[{}] No {} found.", label, REPORT_BUNDLE_DIR_NAME);
    }
    for bundle in &discovered.report_bundles {
        let dest = unique_destination(report_dest_root, bundle)?;
        move_item(bundle, &dest)?;
        organized.report_bundles.push(dest);
    }
    if !organized.report_bundles.is_empty() {
        info!(
            "[{}] Moved {} {} -> {}",
            label,
            organized.report_bundles.len(),
            REPORT_BUNDLE_DIR_NAME,
            report_dest_root.display()
        );
    }

    Ok(organized)
}

/// Destination for `source` inside `dest_root`, suffixed `_1`, `_2`, ... when
/// the plain name is already taken (several bundles share one literal name).
fn unique_destination(dest_root: &Path, source: &Path) -> AppResult<PathBuf> {
    let name = source.file_name().ok_or_else(|| {
        AppError::FileSystemError(format!("Path has no file name: {}", source.display()))
    })?;

    let candidate = dest_root.join(name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let name = name.to_string_lossy();
    (1..u32::MAX)
        .map(|counter| dest_root.join(format!("{}_{}", name, counter)))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| AppError::FileSystemError(format!("No free destination name for {}", source.display())))
}

/// Move a file or directory, falling back to copy + delete when a plain
/// rename is not possible (e.g. across mount points).
pub fn move_item(source_path: &Path, dest_path: &Path) -> AppResult<()> {
    if !source_path.exists() {
        return Err(AppError::NotFoundError(format!(
            "Source path does not exist: {}",
            source_path.display()
        )));
    }

    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(source_path, dest_path) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(
                "Rename {} -> {} failed ({}), copying instead",
                source_path.display(),
                dest_path.display(),
                e
            );
            if source_path.is_dir() {
                copy_dir_recursive(source_path, dest_path)?;
            } else {
                fs::copy(source_path, dest_path)?;
            }
            remove_path(source_path)
        }
    }
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> AppResult<()> {
    for entry in WalkDir::new(source) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(source).map_err(|e| {
            AppError::FileSystemError(format!("Failed to relativize {}: {}", entry.path().display(), e))
        })?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove a file or a directory tree.
pub fn remove_path(path: &Path) -> AppResult<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| AppError::FileSystemError(format!("Failed to remove {}: {}", path.display(), e)))
}

/// Delete every top-level entry of `dir` whose name matches none of `keep_patterns`.
///
/// Kept entries are preserved with their full contents. With `dry_run` the
/// report is produced but nothing is touched.
pub fn cleanup_directory(dir: &Path, keep_patterns: &[&str], dry_run: bool) -> AppResult<CleanupReport> {
    let patterns = keep_patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| AppError::ConfigError(format!("Invalid keep pattern '{}': {}", p, e)))
        })
        .collect::<AppResult<Vec<_>>>()?;

    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    let mut report = CleanupReport::default();
    for path in entries {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if patterns.iter().any(|p| p.matches(&name)) {
            report.kept.push(path);
            continue;
        }

        if dry_run {
            info!("[DRY RUN] Would delete: {}", path.display());
        } else {
            remove_path(&path)?;
        }
        report.removed.push(path);
    }

    Ok(report)
}
