use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// Tally of one purge run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub failures: usize,
}

impl PurgeReport {
    fn merge(&mut self, other: PurgeReport) {
        self.files_removed += other.files_removed;
        self.dirs_removed += other.dirs_removed;
        self.failures += other.failures;
    }
}

/// Empty the given storage directories, keeping the directories themselves.
///
/// Files and symlinks are unlinked; subdirectories are emptied recursively
/// and then removed. Failures are logged and counted, never fatal.
pub fn purge_storage<P: AsRef<Path>>(dirs: &[P]) -> PurgeReport {
    let mut report = PurgeReport::default();

    for dir in dirs {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            warn!("Skipping purge of {}: not a directory", dir.display());
            continue;
        }
        report.merge(purge_dir(dir));
    }

    info!(
        "Storage purge finished: {} files, {} dirs removed, {} failures",
        report.files_removed, report.dirs_removed, report.failures
    );
    report
}

fn purge_dir(dir: &Path) -> PurgeReport {
    let mut report = PurgeReport::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Failed to read {}: {}", dir.display(), e);
            report.failures += 1;
            return report;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        // symlink_metadata: never follow links out of the storage dir
        let is_dir = match fs::symlink_metadata(&path) {
            Ok(meta) => meta.is_dir(),
            Err(e) => {
                error!("Failed to stat {}: {}", path.display(), e);
                report.failures += 1;
                continue;
            }
        };

        if is_dir {
            report.merge(purge_dir(&path));
            match fs::remove_dir(&path) {
                Ok(()) => {
                    info!("Deleted directory: {}", path.display());
                    report.dirs_removed += 1;
                }
                Err(e) => {
                    error!("Failed to delete {}. Reason: {}", path.display(), e);
                    report.failures += 1;
                }
            }
        } else {
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Deleted file: {}", path.display());
                    report.files_removed += 1;
                }
                Err(e) => {
                    error!("Failed to delete {}. Reason: {}", path.display(), e);
                    report.failures += 1;
                }
            }
        }
    }

    report
}
