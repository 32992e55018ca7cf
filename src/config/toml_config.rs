use crate::core::copy::CopyTask;
use crate::core::duplicates::DuplicatesStrategy;
use crate::core::ConfigProvider;
use crate::domain::model::ClasspathElement;
use crate::utils::error::{PackError, Result};
use crate::utils::validation::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const MAVEN_CENTRAL: &str = "https://repo.maven.apache.org/maven2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackConfig {
    pub project: ProjectConfig,
    #[serde(default)]
    pub repositories: RepositoriesConfig,
    #[serde(default)]
    pub dependencies: DependenciesConfig,
    #[serde(default)]
    pub jar: JarConfig,
    #[serde(default)]
    pub copy: Vec<CopyConfig>,

    /// Directory relative paths are resolved against. Set to the config
    /// file's directory by [`PackConfig::from_file`].
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub version: Option<String>,
    /// Compiled project output, placed ahead of the runtime classpath.
    #[serde(default)]
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoriesConfig {
    #[serde(default = "default_repositories")]
    pub urls: Vec<String>,
    pub cache_dir: Option<String>,
    pub concurrent_downloads: Option<usize>,
    pub timeout_seconds: Option<u64>,
}

impl Default for RepositoriesConfig {
    fn default() -> Self {
        Self {
            urls: default_repositories(),
            cache_dir: None,
            concurrent_downloads: None,
            timeout_seconds: None,
        }
    }
}

fn default_repositories() -> Vec<String> {
    vec![MAVEN_CENTRAL.to_string()]
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependenciesConfig {
    /// Extra dependency list applied on top of `runtime`.
    pub file: Option<String>,
    #[serde(default)]
    pub runtime: Vec<String>,
}

/// Shape of the external file referenced by `dependencies.file`.
#[derive(Debug, Clone, Deserialize)]
struct DependenciesFile {
    #[serde(default)]
    runtime: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JarConfig {
    #[serde(default = "default_main_class")]
    pub main_class: String,
    #[serde(default = "default_jar_duplicates")]
    pub duplicates_strategy: DuplicatesStrategy,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    pub archive_name: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Default for JarConfig {
    fn default() -> Self {
        Self {
            main_class: default_main_class(),
            duplicates_strategy: default_jar_duplicates(),
            exclude: Vec::new(),
            output_dir: default_output_dir(),
            archive_name: None,
            attributes: BTreeMap::new(),
        }
    }
}

fn default_main_class() -> String {
    "main.Server".to_string()
}

fn default_jar_duplicates() -> DuplicatesStrategy {
    DuplicatesStrategy::Exclude
}

fn default_output_dir() -> String {
    "build/libs".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    pub from: Vec<String>,
    pub into: String,
    #[serde(default = "default_copy_duplicates")]
    pub duplicates_strategy: DuplicatesStrategy,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub expand_archives: bool,
}

fn default_copy_duplicates() -> DuplicatesStrategy {
    DuplicatesStrategy::Include
}

impl PackConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.base_dir = path
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content)?;

        let mut config: PackConfig = toml::from_str(&processed_content)?;
        config.base_dir = PathBuf::from(".");
        Ok(config)
    }

    pub fn validate_config(&self) -> Result<()> {
        crate::utils::validation::validate_non_empty_string("project.name", &self.project.name)?;
        crate::utils::validation::validate_class_name("jar.main_class", &self.jar.main_class)?;
        crate::utils::validation::validate_path("jar.output_dir", &self.jar.output_dir)?;

        if self.repositories.urls.is_empty() {
            return Err(PackError::MissingConfigError {
                field: "repositories.urls".to_string(),
            });
        }
        for url in &self.repositories.urls {
            crate::utils::validation::validate_url("repositories.urls", url)?;
        }

        if let Some(concurrent) = self.repositories.concurrent_downloads {
            crate::utils::validation::validate_positive_number(
                "repositories.concurrent_downloads",
                concurrent,
                1,
            )?;
        }

        for (name, value) in &self.jar.attributes {
            if name.eq_ignore_ascii_case(crate::core::manifest::MAIN_CLASS) {
                crate::utils::validation::validate_class_name("jar.attributes.Main-Class", value)?;
            }
        }

        if let Some(name) = &self.jar.archive_name {
            crate::utils::validation::validate_non_empty_string("jar.archive_name", name)?;
            if name.contains(['/', '\\']) {
                return Err(PackError::InvalidConfigValueError {
                    field: "jar.archive_name".to_string(),
                    value: name.clone(),
                    reason: "Archive name cannot contain path separators".to_string(),
                });
            }
        }

        for (index, copy) in self.copy.iter().enumerate() {
            if copy.from.is_empty() {
                return Err(PackError::MissingConfigError {
                    field: format!("copy[{}].from", index),
                });
            }
            crate::utils::validation::validate_path(&format!("copy[{}].into", index), &copy.into)?;
        }

        Ok(())
    }

    pub fn resolve_path(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.jar.output_dir)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.resolve_path(self.repositories.cache_dir.as_deref().unwrap_or(".pack-cache"))
    }

    pub fn concurrent_downloads(&self) -> usize {
        self.repositories.concurrent_downloads.unwrap_or(4)
    }

    pub fn class_dirs(&self) -> Vec<ClasspathElement> {
        self.project
            .classes
            .iter()
            .map(|dir| ClasspathElement::from_path(self.resolve_path(dir)))
            .collect()
    }

    /// `dependencies.runtime` followed by the entries of `dependencies.file`.
    pub fn runtime_classpath(&self) -> Result<Vec<ClasspathElement>> {
        let mut specs = self.dependencies.runtime.clone();

        if let Some(file) = &self.dependencies.file {
            let path = self.resolve_path(file);
            tracing::debug!("Applying dependencies from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let extra: DependenciesFile = toml::from_str(&substitute_env_vars(&content)?)
                .map_err(|e| {
                    PackError::config(format!("{}: TOML parsing error: {}", path.display(), e))
                })?;
            specs.extend(extra.runtime);
        }

        specs
            .iter()
            .map(|notation| ClasspathElement::parse(notation, &self.base_dir))
            .collect()
    }

    pub fn copy_tasks(&self) -> Vec<CopyTask> {
        self.copy
            .iter()
            .map(|copy| CopyTask {
                from: copy.from.iter().map(|p| self.resolve_path(p)).collect(),
                into: self.resolve_path(&copy.into),
                duplicates_strategy: copy.duplicates_strategy,
                exclude: copy.exclude.clone(),
                expand_archives: copy.expand_archives,
            })
            .collect()
    }
}

/// 替換環境變數 (例如 ${REPO_URL})
fn substitute_env_vars(content: &str) -> Result<String> {
    use regex::Regex;
    let re = Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| PackError::config(format!("env pattern: {}", e)))?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    });

    Ok(result.to_string())
}

impl ConfigProvider for PackConfig {
    fn archive_name(&self) -> String {
        match (&self.jar.archive_name, &self.project.version) {
            (Some(name), _) => name.clone(),
            (None, Some(version)) => format!("{}-{}.jar", self.project.name, version),
            (None, None) => format!("{}.jar", self.project.name),
        }
    }

    fn main_class(&self) -> &str {
        &self.jar.main_class
    }

    fn duplicates_strategy(&self) -> DuplicatesStrategy {
        self.jar.duplicates_strategy
    }

    fn exclude_patterns(&self) -> &[String] {
        &self.jar.exclude
    }

    fn manifest_attributes(&self) -> &BTreeMap<String, String> {
        &self.jar.attributes
    }
}

impl Validate for PackConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
