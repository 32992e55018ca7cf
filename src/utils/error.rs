use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Download failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Directory walk failed: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Entry '{name}' is duplicated ({first} and {second})")]
    DuplicateEntry {
        name: String,
        first: String,
        second: String,
    },

    #[error("Could not resolve {coordinate}: {message}")]
    Resolution { coordinate: String, message: String },

    #[error("Invalid manifest: {message}")]
    ManifestError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Archive,
    FileSystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PackError {
    pub fn config(message: impl Into<String>) -> Self {
        PackError::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PackError::ConfigError { .. }
            | PackError::InvalidConfigValueError { .. }
            | PackError::MissingConfigError { .. }
            | PackError::SerializationError(_)
            | PackError::TomlError(_) => ErrorCategory::Configuration,
            PackError::HttpError(_) | PackError::Resolution { .. } => ErrorCategory::Network,
            PackError::ZipError(_)
            | PackError::DuplicateEntry { .. }
            | PackError::ManifestError { .. } => ErrorCategory::Archive,
            PackError::IoError(_) | PackError::WalkError(_) => ErrorCategory::FileSystem,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Archive => ErrorSeverity::High,
            ErrorCategory::FileSystem => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            PackError::DuplicateEntry { .. } => {
                "Switch duplicates_strategy to 'exclude' or 'warn', or exclude one of the entries"
            }
            PackError::Resolution { .. } | PackError::HttpError(_) => {
                "Check the coordinate spelling and that a repository in [repositories] serves it"
            }
            PackError::ManifestError { .. } => "Check jar.main_class and jar.attributes",
            PackError::ZipError(_) => "Check that every archive on the classpath is a valid zip",
            PackError::IoError(_) | PackError::WalkError(_) => {
                "Check that the paths exist and are readable/writable"
            }
            _ => "Review the configuration file",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Network => format!("Dependency download problem: {}", self),
            ErrorCategory::Archive => format!("Archive assembly problem: {}", self),
            ErrorCategory::FileSystem => format!("File system problem: {}", self),
        }
    }

    /// Process exit code for the binaries.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, PackError>;
