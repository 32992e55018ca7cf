use crate::core::manifest::Manifest;
use crate::utils::error::{PackError, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// One element of the runtime classpath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClasspathElement {
    /// Copied into the archive as-is.
    Directory(PathBuf),
    /// Expanded into the archive.
    Archive(PathBuf),
    /// Needs resolving against a repository before it can be expanded.
    Coordinate(MavenCoordinate),
}

impl ClasspathElement {
    /// Parses a `[dependencies] runtime` value. Coordinates are recognised by
    /// their `group:artifact:version` shape, everything else is a path relative
    /// to `base`.
    pub fn parse(notation: &str, base: &Path) -> Result<Self> {
        let notation = notation.trim();
        if MavenCoordinate::looks_like(notation) {
            return Ok(ClasspathElement::Coordinate(notation.parse()?));
        }

        crate::utils::validation::validate_path("dependencies.runtime", notation)?;
        Ok(Self::from_path(base.join(notation)))
    }

    pub fn from_path(path: PathBuf) -> Self {
        if path.is_dir() {
            ClasspathElement::Directory(path)
        } else {
            ClasspathElement::Archive(path)
        }
    }

    /// Missing paths are silently dropped from the classpath.
    pub fn exists(&self) -> bool {
        match self {
            ClasspathElement::Directory(path) | ClasspathElement::Archive(path) => path.exists(),
            ClasspathElement::Coordinate(_) => true,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ClasspathElement::Directory(path) | ClasspathElement::Archive(path) => {
                path.display().to_string()
            }
            ClasspathElement::Coordinate(coordinate) => coordinate.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MavenCoordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
}

impl MavenCoordinate {
    fn looks_like(notation: &str) -> bool {
        let colons = notation.matches(':').count();
        (2..=3).contains(&colons)
            && !notation.contains('/')
            && !notation.contains('\\')
            && !notation.ends_with(".jar")
            && !notation.ends_with(".zip")
    }

    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!("{}-{}-{}.jar", self.artifact, self.version, classifier),
            None => format!("{}-{}.jar", self.artifact, self.version),
        }
    }

    /// Path of the artifact inside a Maven 2 layout repository.
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.file_name()
        )
    }
}

impl FromStr for MavenCoordinate {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let invalid = |reason: &str| PackError::InvalidConfigValueError {
            field: "dependencies.runtime".to_string(),
            value: s.to_string(),
            reason: reason.to_string(),
        };

        if !(3..=4).contains(&parts.len()) {
            return Err(invalid("Expected group:artifact:version[:classifier]"));
        }
        if parts.iter().any(|part| part.is_empty()) {
            return Err(invalid("Coordinate parts cannot be empty"));
        }

        Ok(MavenCoordinate {
            group: parts[0].to_string(),
            artifact: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier: parts.get(3).map(|c| c.to_string()),
        })
    }
}

impl fmt::Display for MavenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        Ok(())
    }
}

/// A file destined for the output archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Forward-slash separated, never starts with `/`.
    pub name: String,
    pub data: Vec<u8>,
    pub unix_mode: Option<u32>,
    /// Classpath element the entry came from.
    pub origin: String,
}

impl ArchiveEntry {
    pub fn new(name: &str, data: Vec<u8>, origin: impl Into<String>) -> Self {
        Self {
            name: normalize_entry_name(name),
            data,
            unix_mode: None,
            origin: origin.into(),
        }
    }

    /// Modes without any permission bits are dropped.
    pub fn with_unix_mode(mut self, mode: Option<u32>) -> Self {
        self.unix_mode = mode.filter(|m| m & 0o777 != 0);
        self
    }
}

pub fn normalize_entry_name(name: &str) -> String {
    name.replace('\\', "/").trim_start_matches('/').to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackReport {
    pub collected: usize,
    pub excluded: usize,
    pub duplicates: usize,
    pub manifests_replaced: usize,
    pub written: usize,
}

#[derive(Debug, Clone)]
pub struct AssembledArchive {
    pub manifest: Manifest,
    pub entries: Vec<ArchiveEntry>,
    pub report: PackReport,
}
