use crate::core::duplicates::DuplicatesStrategy;
use crate::core::pattern::ExcludeSet;
use crate::core::pipeline::{collect_archive, collect_directory};
use crate::domain::model::ArchiveEntry;
use crate::utils::error::{PackError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Copies files from several sources into one directory.
///
/// Unlike archive assembly, copies default to [`DuplicatesStrategy::Include`]:
/// every source file is written, and a later file overwrites an earlier one
/// at the same relative path.
#[derive(Debug, Clone)]
pub struct CopyTask {
    pub from: Vec<PathBuf>,
    pub into: PathBuf,
    pub duplicates_strategy: DuplicatesStrategy,
    pub exclude: Vec<String>,
    pub expand_archives: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub copied: usize,
    pub overwritten: usize,
    pub skipped: usize,
    pub excluded: usize,
}

impl CopyTask {
    pub fn new(from: Vec<PathBuf>, into: PathBuf) -> Self {
        Self {
            from,
            into,
            duplicates_strategy: DuplicatesStrategy::Include,
            exclude: Vec::new(),
            expand_archives: false,
        }
    }

    pub async fn run(&self) -> Result<CopyReport> {
        let task = self.clone();
        tokio::task::spawn_blocking(move || task.run_blocking())
            .await
            .map_err(|e| PackError::config(format!("copy task failed: {}", e)))?
    }

    pub fn run_blocking(&self) -> Result<CopyReport> {
        // only user patterns apply here; signature files are an archive concern
        let excludes = ExcludeSet::exact(self.exclude.clone())?;
        let mut report = CopyReport::default();
        let mut written: HashMap<String, String> = HashMap::new();

        std::fs::create_dir_all(&self.into)?;

        for source in &self.from {
            if !source.exists() {
                tracing::debug!("Skipping missing copy source {}", source.display());
                continue;
            }

            for entry in self.source_entries(source)? {
                if excludes.is_excluded(&entry.name) {
                    report.excluded += 1;
                    continue;
                }

                if let Some(previous) = written.get(&entry.name) {
                    match self.duplicates_strategy {
                        DuplicatesStrategy::Include => report.overwritten += 1,
                        DuplicatesStrategy::Exclude => {
                            report.skipped += 1;
                            continue;
                        }
                        DuplicatesStrategy::Warn => {
                            tracing::warn!(
                                "⚠️ Duplicate {}: keeping {}, skipping {}",
                                entry.name,
                                previous,
                                entry.origin
                            );
                            report.skipped += 1;
                            continue;
                        }
                        DuplicatesStrategy::Fail => {
                            return Err(PackError::DuplicateEntry {
                                name: entry.name,
                                first: previous.clone(),
                                second: entry.origin,
                            })
                        }
                    }
                } else {
                    report.copied += 1;
                }

                write_entry(&self.into, &entry)?;
                written.insert(entry.name, entry.origin);
            }
        }

        tracing::info!(
            "📋 Copied {} files into {} ({} overwritten, {} skipped, {} excluded)",
            report.copied,
            self.into.display(),
            report.overwritten,
            report.skipped,
            report.excluded
        );
        Ok(report)
    }

    fn source_entries(&self, source: &Path) -> Result<Vec<ArchiveEntry>> {
        if source.is_dir() {
            return collect_directory(source);
        }
        if self.expand_archives && is_archive(source) {
            return collect_archive(source);
        }

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| PackError::config(format!("{} has no file name", source.display())))?;
        let data = std::fs::read(source)?;
        Ok(vec![ArchiveEntry::new(&name, data, source.display().to_string())])
    }
}

fn is_archive(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("jar") | Some("zip")
    )
}

fn write_entry(into: &Path, entry: &ArchiveEntry) -> Result<()> {
    let target = into.join(&entry.name);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, &entry.data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = entry.unix_mode {
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode & 0o777))?;
        }
    }
    Ok(())
}
