use clap::Parser;
use netty_pack::core::pipeline::read_manifest;
use netty_pack::core::ConfigProvider;
use netty_pack::domain::model::ClasspathElement;
use netty_pack::utils::error::PackError;
use netty_pack::utils::{logger, validation::Validate};
use netty_pack::{JarPipeline, LocalStorage, PackConfig, PackEngine, Resolver};
use std::io::Cursor;

#[derive(Parser)]
#[command(name = "pack")]
#[command(about = "Assemble a runnable fat jar from a TOML build description")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "pack.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Dry run - show what would be packed without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Print the manifest and entries of an existing archive and exit
    #[arg(long, value_name = "JAR")]
    inspect: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    logger::init_cli_logger(args.verbose);

    if let Some(jar) = &args.inspect {
        if let Err(e) = inspect(jar).await {
            fail(&e);
        }
        return Ok(());
    }

    tracing::info!("🚀 Starting pack");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let config = match PackConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    let runtime = match config.runtime_classpath() {
        Ok(runtime) => runtime,
        Err(e) => fail(&e),
    };

    display_config_summary(&config, &runtime, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No archive will be written");
        perform_dry_run(&config, &runtime);
        return Ok(());
    }

    if let Err(e) = run(config, runtime).await {
        fail(&e);
    }

    Ok(())
}

async fn run(config: PackConfig, runtime: Vec<ClasspathElement>) -> netty_pack::Result<()> {
    let class_dirs = config.class_dirs();
    let copy_tasks = config.copy_tasks();

    let resolver = Resolver::from_config(&config)?;
    let storage = LocalStorage::new(config.output_dir());
    let pipeline = JarPipeline::new(storage, config);
    let engine = PackEngine::with_resolver(pipeline, resolver);

    let outcome = engine.run(class_dirs, runtime).await?;
    tracing::info!("✅ Archive assembled successfully!");
    println!("✅ Archive assembled successfully!");
    println!("📁 Output saved to: {}", outcome.output_path);
    println!(
        "📊 {} entries written ({} collected, {} excluded, {} duplicates)",
        outcome.report.written,
        outcome.report.collected,
        outcome.report.excluded,
        outcome.report.duplicates
    );

    for task in copy_tasks {
        let report = task.run().await?;
        println!(
            "📂 Copied into {}: {} files ({} overwritten, {} skipped, {} excluded)",
            task.into.display(),
            report.copied,
            report.overwritten,
            report.skipped,
            report.excluded
        );
    }

    Ok(())
}

async fn inspect(jar: &str) -> netty_pack::Result<()> {
    let bytes = tokio::fs::read(jar).await?;
    let manifest = read_manifest(&bytes)?;

    println!("📋 Manifest of {}:", jar);
    for (name, value) in manifest.attributes() {
        println!("  {}: {}", name, value);
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    println!();
    println!("📦 {} entries:", archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        println!("  {} ({} bytes)", file.name(), file.size());
    }

    Ok(())
}

fn fail(e: &PackError) -> ! {
    tracing::error!(
        "❌ Pack failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    std::process::exit(e.exit_code().max(1));
}

fn display_config_summary(config: &PackConfig, runtime: &[ClasspathElement], args: &Args) {
    println!("📋 Configuration Summary:");
    match &config.project.version {
        Some(version) => println!("  Project: {} v{}", config.project.name, version),
        None => println!("  Project: {}", config.project.name),
    }
    println!("  Archive: {}", config.archive_name());
    println!("  Main-Class: {}", config.main_class());
    println!("  Duplicates: {}", config.duplicates_strategy());
    println!("  Output: {}", config.output_dir().display());
    println!("  Class directories: {}", config.project.classes.len());
    println!("  Runtime classpath: {}", runtime.len());
    println!("  Copy tasks: {}", config.copy.len());

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &PackConfig, runtime: &[ClasspathElement]) {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📥 Classpath (in packing order):");
    for element in config.class_dirs().iter().chain(runtime) {
        let marker = match element {
            ClasspathElement::Coordinate(_) => "⬇️",
            other if other.exists() => "✅",
            _ => "⚠️ missing, will be skipped:",
        };
        println!("  {} {}", marker, element.describe());
    }

    println!();
    println!("📡 Repositories:");
    for url in &config.repositories.urls {
        println!("  {}", url);
    }
    println!("  Cache: {}", config.cache_dir().display());

    println!();
    println!("🧹 Excluded from the archive:");
    for pattern in netty_pack::core::pattern::DEFAULT_EXCLUDES
        .iter()
        .copied()
        .chain(config.exclude_patterns().iter().map(String::as_str))
    {
        println!("  {}", pattern);
    }

    if !config.manifest_attributes().is_empty() {
        println!();
        println!("🏷️ Extra manifest attributes:");
        for (name, value) in config.manifest_attributes() {
            println!("  {}: {}", name, value);
        }
    }

    for task in config.copy_tasks() {
        println!();
        println!(
            "📂 Copy {} sources into {} ({})",
            task.from.len(),
            task.into.display(),
            task.duplicates_strategy
        );
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");
}
