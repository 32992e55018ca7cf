//! Resolves Maven coordinates on the runtime classpath to local archives.

use crate::config::toml_config::PackConfig;
use crate::domain::model::{ClasspathElement, MavenCoordinate};
use crate::utils::error::{PackError, Result};
use reqwest::Client;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

#[derive(Debug, Clone)]
pub struct Resolver {
    client: Client,
    repositories: Vec<String>,
    cache_dir: PathBuf,
    concurrency: usize,
}

impl Resolver {
    pub fn new(
        repositories: Vec<String>,
        cache_dir: PathBuf,
        concurrency: usize,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            repositories,
            cache_dir,
            concurrency: concurrency.max(1),
        })
    }

    pub fn from_config(config: &PackConfig) -> Result<Self> {
        Self::new(
            config.repositories.urls.clone(),
            config.cache_dir(),
            config.concurrent_downloads(),
            config.repositories.timeout_seconds.map(Duration::from_secs),
        )
    }

    pub fn cached_path(&self, coordinate: &MavenCoordinate) -> PathBuf {
        self.cache_dir.join(coordinate.repository_path())
    }

    /// Returns the local path of `coordinate`, downloading it on a cache miss.
    pub async fn resolve(&self, coordinate: &MavenCoordinate) -> Result<PathBuf> {
        let target = self.cached_path(coordinate);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            tracing::debug!("Using cached {}", coordinate);
            return Ok(target);
        }

        let relative = coordinate.repository_path();
        let mut last_error = String::from("no repositories configured");

        for repository in &self.repositories {
            let location = format!("{}/{}", repository.trim_end_matches('/'), relative);
            match self.fetch(&location).await {
                Ok(Some(bytes)) => {
                    let size = bytes.len();
                    store(&target, bytes).await?;
                    tracing::info!("📦 Downloaded {} ({} bytes) from {}", coordinate, size, repository);
                    return Ok(target);
                }
                Ok(None) => {
                    tracing::debug!("{} not found in {}", coordinate, repository);
                    last_error = format!("not found in {}", repository);
                }
                Err(e) => {
                    tracing::warn!("⚠️ Repository {} failed for {}: {}", repository, coordinate, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(PackError::Resolution {
            coordinate: coordinate.to_string(),
            message: last_error,
        })
    }

    /// Replaces every coordinate in `classpath` with the archive it resolves
    /// to. Order is preserved; a coordinate listed more than once keeps only
    /// its first position.
    pub async fn resolve_all(&self, classpath: Vec<ClasspathElement>) -> Result<Vec<ClasspathElement>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut resolved: Vec<Option<ClasspathElement>> = Vec::with_capacity(classpath.len());
        let mut seen = HashSet::new();

        for element in classpath {
            match element {
                ClasspathElement::Coordinate(coordinate) => {
                    if !seen.insert(coordinate.clone()) {
                        tracing::debug!("Ignoring repeated dependency {}", coordinate);
                        continue;
                    }
                    let index = resolved.len();
                    resolved.push(None);
                    let resolver = self.clone();
                    let semaphore = Arc::clone(&semaphore);
                    tasks.spawn(async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| PackError::config(format!("download pool closed: {}", e)))?;
                        let path = resolver.resolve(&coordinate).await?;
                        Ok::<_, PackError>((index, path))
                    });
                }
                other => resolved.push(Some(other)),
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, path) = joined.map_err(|e| PackError::config(format!("download task failed: {}", e)))??;
            resolved[index] = Some(ClasspathElement::Archive(path));
        }

        Ok(resolved.into_iter().flatten().collect())
    }

    async fn fetch(&self, location: &str) -> Result<Option<Vec<u8>>> {
        if let Some(path) = file_url_path(location) {
            return match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            };
        }

        let response = self.client.get(location).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PackError::Resolution {
                coordinate: location.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }
}

fn file_url_path(location: &str) -> Option<PathBuf> {
    if !location.starts_with("file:") {
        return None;
    }
    Url::parse(location).ok()?.to_file_path().ok()
}

/// Writes through a uniquely named sibling so readers never see a partial
/// archive and concurrent downloads of one artifact do not collide.
async fn store(target: &Path, bytes: Vec<u8>) -> Result<()> {
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;

        let mut partial = tempfile::NamedTempFile::new_in(&parent)?;
        partial.write_all(&bytes)?;
        partial.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| PackError::config(format!("cache write failed: {}", e)))?
}
