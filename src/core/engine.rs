use crate::core::resolver::Resolver;
use crate::core::Pipeline;
use crate::domain::model::{ClasspathElement, PackReport};
use crate::utils::error::Result;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PackOutcome {
    pub output_path: String,
    pub report: PackReport,
}

pub struct PackEngine<P: Pipeline> {
    pipeline: P,
    resolver: Option<Resolver>,
}

impl<P: Pipeline> PackEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            resolver: None,
        }
    }

    pub fn with_resolver(pipeline: P, resolver: Resolver) -> Self {
        Self {
            pipeline,
            resolver: Some(resolver),
        }
    }

    /// Project output first, then the runtime classpath, in that order.
    pub async fn run(
        &self,
        class_dirs: Vec<ClasspathElement>,
        runtime: Vec<ClasspathElement>,
    ) -> Result<PackOutcome> {
        let started = Instant::now();
        tracing::info!("🚀 Starting archive assembly");

        let runtime = match &self.resolver {
            Some(resolver) => {
                tracing::info!("🔎 Resolving {} runtime classpath elements", runtime.len());
                resolver.resolve_all(runtime).await?
            }
            None => runtime,
        };

        let mut classpath = class_dirs;
        classpath.extend(runtime);

        // Extract
        tracing::info!("📥 Collecting entries from {} classpath elements", classpath.len());
        let entries = self.pipeline.extract(&classpath).await?;
        tracing::info!("Collected {} entries", entries.len());

        // Transform
        let assembled = self.pipeline.transform(entries).await?;
        tracing::info!(
            "🧹 Excluded {}, resolved {} duplicates, replaced {} manifests",
            assembled.report.excluded,
            assembled.report.duplicates,
            assembled.report.manifests_replaced
        );
        let report = assembled.report.clone();

        // Load
        let output_path = self.pipeline.load(assembled).await?;
        tracing::info!("📁 Archive written to {} in {:?}", output_path, started.elapsed());

        Ok(PackOutcome {
            output_path,
            report,
        })
    }
}
