use crate::core::duplicates::DuplicatesStrategy;
use crate::domain::model::{ArchiveEntry, AssembledArchive, ClasspathElement};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Human readable location of `path`, used in logs and return values.
    fn location(&self, path: &str) -> String;
}

pub trait ConfigProvider: Send + Sync {
    fn archive_name(&self) -> String;
    fn main_class(&self) -> &str;
    fn duplicates_strategy(&self) -> DuplicatesStrategy;
    fn exclude_patterns(&self) -> &[String];
    fn manifest_attributes(&self) -> &BTreeMap<String, String>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self, classpath: &[ClasspathElement]) -> Result<Vec<ArchiveEntry>>;
    async fn transform(&self, entries: Vec<ArchiveEntry>) -> Result<AssembledArchive>;
    async fn load(&self, archive: AssembledArchive) -> Result<String>;
}
