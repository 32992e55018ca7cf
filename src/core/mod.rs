pub mod copy;
pub mod duplicates;
pub mod engine;
pub mod manifest;
pub mod pattern;
pub mod pipeline;
pub mod resolver;

pub use crate::domain::model::{ArchiveEntry, AssembledArchive, ClasspathElement, PackReport};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
