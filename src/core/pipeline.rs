use crate::core::duplicates::{EntrySet, Insertion};
use crate::core::manifest::{Manifest, MANIFEST_PATH};
use crate::core::pattern::ExcludeSet;
use crate::core::{ConfigProvider, Pipeline, Storage};
use crate::domain::model::{ArchiveEntry, AssembledArchive, ClasspathElement, PackReport};
use crate::utils::error::{PackError, Result};
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

/// Assembles a fat archive: project classes and runtime classpath flattened
/// into one jar with a generated manifest.
pub struct JarPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
}

impl<S: Storage, C: ConfigProvider> JarPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &C {
        &self.config
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for JarPipeline<S, C> {
    async fn extract(&self, classpath: &[ClasspathElement]) -> Result<Vec<ArchiveEntry>> {
        let classpath = classpath.to_vec();
        tokio::task::spawn_blocking(move || collect_classpath(&classpath))
            .await
            .map_err(|e| PackError::config(format!("extract task failed: {}", e)))?
    }

    async fn transform(&self, entries: Vec<ArchiveEntry>) -> Result<AssembledArchive> {
        let excludes = ExcludeSet::new(self.config.exclude_patterns())?;
        let mut report = PackReport {
            collected: entries.len(),
            ..PackReport::default()
        };
        let mut set = EntrySet::new(self.config.duplicates_strategy());

        for entry in entries {
            if excludes.is_excluded(&entry.name) {
                tracing::debug!("Excluding {} from {}", entry.name, entry.origin);
                report.excluded += 1;
                continue;
            }
            if entry.name.eq_ignore_ascii_case(MANIFEST_PATH) {
                report.manifests_replaced += 1;
                continue;
            }
            if set.insert(entry)? == Insertion::Added {
                report.written += 1;
            }
        }
        report.duplicates = set.duplicates();

        let mut manifest = Manifest::new(self.config.main_class())?;
        for (name, value) in self.config.manifest_attributes() {
            manifest = manifest.with_attribute(name, value)?;
        }

        Ok(AssembledArchive {
            manifest,
            entries: set.into_entries(),
            report,
        })
    }

    async fn load(&self, archive: AssembledArchive) -> Result<String> {
        let archive_name = self.config.archive_name();
        tracing::debug!(
            "Creating {} with {} entries",
            archive_name,
            archive.entries.len() + 1
        );

        let jar_data = write_archive(&archive)?;

        tracing::debug!("Writing {} ({} bytes) to storage", archive_name, jar_data.len());
        self.storage.write_file(&archive_name, &jar_data).await?;

        Ok(self.storage.location(&archive_name))
    }
}

/// Flattens the classpath in order. Elements that do not exist are skipped.
pub fn collect_classpath(classpath: &[ClasspathElement]) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    for element in classpath {
        if !element.exists() {
            tracing::debug!("Skipping missing classpath element {}", element.describe());
            continue;
        }
        match element {
            ClasspathElement::Directory(dir) => entries.extend(collect_directory(dir)?),
            ClasspathElement::Archive(path) => entries.extend(collect_archive(path)?),
            ClasspathElement::Coordinate(coordinate) => {
                return Err(PackError::Resolution {
                    coordinate: coordinate.to_string(),
                    message: "coordinate was not resolved before extraction".to_string(),
                })
            }
        }
    }
    Ok(entries)
}

pub fn collect_directory(dir: &Path) -> Result<Vec<ArchiveEntry>> {
    let origin = dir.display().to_string();
    let mut entries = Vec::new();

    for item in WalkDir::new(dir).sort_by_file_name() {
        let item = item?;
        if !item.file_type().is_file() {
            continue;
        }
        let relative = item
            .path()
            .strip_prefix(dir)
            .map_err(|e| PackError::config(format!("{}: {}", item.path().display(), e)))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let data = std::fs::read(item.path())?;
        let mode = file_mode(&item.metadata()?);
        entries.push(ArchiveEntry::new(&name, data, origin.clone()).with_unix_mode(mode));
    }

    Ok(entries)
}

pub fn collect_archive(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let origin = path.display().to_string();
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        if file.enclosed_name().is_none() {
            tracing::warn!("⚠️ Ignoring unsafe entry name {} in {}", file.name(), origin);
            continue;
        }

        let name = file.name().to_string();
        let mode = file.unix_mode();
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        entries.push(ArchiveEntry::new(&name, data, origin.clone()).with_unix_mode(mode));
    }

    Ok(entries)
}

/// Serializes `archive` as a jar: `META-INF/`, the manifest, then every entry
/// in order.
pub fn write_archive(archive: &AssembledArchive) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.add_directory("META-INF/", options)?;
    zip.start_file(MANIFEST_PATH, options)?;
    zip.write_all(archive.manifest.render().as_bytes())?;

    for entry in &archive.entries {
        let entry_options = match entry.unix_mode {
            Some(mode) => options.unix_permissions(mode & 0o777),
            None => options,
        };
        zip.start_file(entry.name.as_str(), entry_options)?;
        zip.write_all(&entry.data)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// Reads the manifest back out of a written jar.
pub fn read_manifest(jar: &[u8]) -> Result<Manifest> {
    let mut archive = ZipArchive::new(Cursor::new(jar))?;
    let mut file = archive.by_name(MANIFEST_PATH)?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Manifest::parse(&text)
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::LocalStorage;
    use crate::config::toml_config::PackConfig;

    fn config(extra: &str) -> PackConfig {
        PackConfig::from_toml_str(&format!("[project]\nname = \"netty\"\n{}", extra)).unwrap()
    }

    fn entry(name: &str, data: &str, origin: &str) -> ArchiveEntry {
        ArchiveEntry::new(name, data.as_bytes().to_vec(), origin)
    }

    #[tokio::test]
    async fn test_transform_excludes_signatures_and_source_manifests() {
        let temp = tempfile::TempDir::new().unwrap();
        let pipeline = JarPipeline::new(LocalStorage::new(temp.path()), config(""));

        let entries = vec![
            entry("main/Server.class", "server", "classes"),
            entry("META-INF/MANIFEST.MF", "Main-Class: other.Main\r\n", "lib.jar"),
            entry("META-INF/BC2048KE.SF", "sig", "bcprov.jar"),
            entry("META-INF/BC2048KE.RSA", "sig", "bcprov.jar"),
            entry("META-INF/BC2048KE.DSA", "sig", "bcprov.jar"),
            entry("main/Server.class", "shadow", "lib.jar"),
        ];

        let assembled = pipeline.transform(entries).await.unwrap();
        assert_eq!(assembled.entries.len(), 1);
        assert_eq!(assembled.entries[0].data, b"server");
        assert_eq!(assembled.manifest.main_class(), Some("main.Server"));
        assert_eq!(
            assembled.report,
            PackReport {
                collected: 6,
                excluded: 3,
                duplicates: 1,
                manifests_replaced: 1,
                written: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_transform_fail_strategy() {
        let temp = tempfile::TempDir::new().unwrap();
        let pipeline = JarPipeline::new(
            LocalStorage::new(temp.path()),
            config("[jar]\nduplicates_strategy = \"fail\"\n"),
        );
        let entries = vec![entry("a.txt", "1", "x"), entry("a.txt", "2", "y")];
        assert!(matches!(
            pipeline.transform(entries).await,
            Err(PackError::DuplicateEntry { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_writes_manifest_first() {
        let temp = tempfile::TempDir::new().unwrap();
        let pipeline = JarPipeline::new(
            LocalStorage::new(temp.path()),
            config("[jar]\nattributes = { Implementation-Title = \"netty\" }\n"),
        );
        let assembled = pipeline
            .transform(vec![entry("main/Server.class", "server", "classes")])
            .await
            .unwrap();

        let location = pipeline.load(assembled).await.unwrap();
        assert!(location.ends_with("netty.jar"));

        let bytes = std::fs::read(temp.path().join("netty.jar")).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        assert_eq!(archive.by_index(0).unwrap().name(), "META-INF/");
        assert_eq!(archive.by_index(1).unwrap().name(), MANIFEST_PATH);
        assert_eq!(archive.by_index(2).unwrap().name(), "main/Server.class");

        let manifest = read_manifest(&bytes).unwrap();
        assert_eq!(manifest.main_class(), Some("main.Server"));
        assert_eq!(manifest.get("Implementation-Title"), Some("netty"));
    }

    #[test]
    fn test_collect_directory_uses_relative_forward_slash_names() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("main/sub")).unwrap();
        std::fs::write(temp.path().join("main/Server.class"), b"a").unwrap();
        std::fs::write(temp.path().join("main/sub/Util.class"), b"b").unwrap();

        let entries = collect_directory(temp.path()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["main/Server.class", "main/sub/Util.class"]);
    }

    #[test]
    fn test_missing_elements_are_skipped() {
        let classpath = vec![ClasspathElement::Archive("does/not/exist.jar".into())];
        assert!(collect_classpath(&classpath).unwrap().is_empty());
    }
}
