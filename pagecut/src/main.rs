use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use pagecut::CaptureService;
use pagecut::config::load_config;
use pagecut::db::Database;
use pagecut::document::PdfiumLoader;
use pagecut::error::CaptureError;
use pagecut::script::{load_script, run_script};

const USAGE: &str = "usage: pagecut <document.pdf> <script.json> [output_dir]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let mut args = std::env::args_os().skip(1);
    let (Some(document_path), Some(script_path)) = (args.next(), args.next()) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let document_path = PathBuf::from(document_path);
    let script_path = PathBuf::from(script_path);

    let config = load_config()?;
    let output_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.export.output_dir.clone());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        document = %document_path.display(),
        script = %script_path.display(),
        "Starting pagecut"
    );

    let database = if config.storage.persist_captures {
        let path = config.storage.database_path();
        let database = Database::open(&path)?;
        info!(path = %path.display(), "Database initialized");
        Some(database)
    } else {
        None
    };

    let loader = Arc::new(PdfiumLoader::new()?);
    let service = CaptureService::new(config, loader, database)?;

    let name = document_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CaptureError::DocumentLoad {
            message: format!("{} is not a file", document_path.display()),
        })?;
    let bytes = tokio::fs::read(&document_path).await?;
    service.open_document(&name, bytes).await?;

    let script = load_script(&script_path).await?;
    let mut report = run_script(&service, &script).await?;
    if report.failures() > 0 {
        warn!(failures = report.failures(), "Some actions failed");
    }

    if report.sections.is_empty() {
        info!("No sections captured, skipping export");
    } else {
        let path = service.export_to_dir(&output_dir).await?;
        info!(path = %path.display(), "Archive written");
        report.archive = Some(path.display().to_string());
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format().with_target(true).compact();

    // RUST_LOG wins; otherwise info for this crate. Logs go to stderr so the
    // JSON report on stdout stays clean.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagecut=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
