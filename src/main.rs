use anyhow::{Context, Result};
use clap::Parser;
use clinicscan::batch::{run_batch, BatchOptions};
use clinicscan::browser::ChromeDriver;
use clinicscan::catalog::SignatureCatalog;
use clinicscan::cli::Args;
use clinicscan::config::{self, AppConfig, CONFIG_PATH};
use clinicscan::email_provider::{MxResolver, StaticMxResolver, SystemMxResolver};
use clinicscan::logger::{ScanLogger, VerbosityLevel};
use clinicscan::orchestrator::SiteScanner;
use clinicscan::sheet::CsvSheet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --init flag first (before any other processing)
    if args.init {
        match AppConfig::create_default_config() {
            Ok(path) => {
                println!("Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize settings, then run clinicscan again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = args.validate() {
        eprintln!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.default_log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let app_config = load_config(args.config.as_deref());

    let verbosity = VerbosityLevel::from_verbose_count(args.verbose);
    let logger = Arc::new(match &args.log_file {
        Some(log_file_path) => ScanLogger::with_log_file(verbosity, log_file_path.clone()),
        None => ScanLogger::new(verbosity),
    });

    // First Ctrl-C stops scheduling; a second one exits immediately
    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = interrupted.clone();
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!("\nForce exiting. Sites in flight were not written.");
            std::process::exit(130); // 130 = 128 + SIGINT(2)
        }
        eprintln!("\nInterrupt received. Finishing sites in flight (Ctrl-C again to force exit)...");
    })
    .unwrap_or_else(|e| {
        eprintln!("Warning: Failed to set Ctrl-C handler: {}. Interrupt signals may not be handled gracefully.", e);
    });

    let summary = match run(&args, &app_config, logger.clone(), interrupted).await {
        Ok(summary) => summary,
        Err(e) => {
            logger.error(&format!("{:#}", e));
            export_logs(&logger);
            std::process::exit(1);
        }
    };

    logger.print_final_summary(&summary);
    export_logs(&logger);

    if summary.interrupted {
        std::process::exit(130);
    }
    Ok(())
}

async fn run(
    args: &Args,
    app_config: &AppConfig,
    logger: Arc<ScanLogger>,
    interrupted: Arc<AtomicBool>,
) -> Result<clinicscan::batch::BatchSummary> {
    let catalog = match app_config.catalog.override_path() {
        Some(path) => SignatureCatalog::load_from_path(path)
            .with_context(|| format!("Failed to load signature catalog {}", path.display()))?,
        None => SignatureCatalog::builtin().context("Failed to compile built-in signature catalog")?,
    };
    info!("Signature catalog v{} loaded", catalog.version);

    let mx: Arc<dyn MxResolver> = match SystemMxResolver::from_system_conf() {
        Ok(resolver) => Arc::new(resolver),
        Err(e) => {
            warn!("System resolver unavailable, email provider will be not_detected: {}", e);
            Arc::new(StaticMxResolver::new())
        }
    };

    let scanner = Arc::new(SiteScanner::new(
        Arc::new(catalog),
        Arc::new(ChromeDriver::new(app_config.browser.max_instances)),
        app_config.http_client()?,
        mx,
        app_config.scan_settings(),
    ));

    let sheet_path: PathBuf = args
        .sheet
        .clone()
        .unwrap_or_else(|| PathBuf::from(&app_config.sheet.path));
    let sheet = CsvSheet::open(&sheet_path)?;
    logger.info(&format!("Scanning sheet {}", sheet.path().display()));

    let options = BatchOptions {
        concurrency: args.concurrency.unwrap_or(app_config.scan.concurrency),
        url_column: app_config.sheet.url_column,
        resume_column: app_config.sheet.resume_column.clone(),
        interrupted,
    };

    run_batch(scanner, Arc::new(Mutex::new(sheet)), &options, logger).await
}

/// Load configuration or exit with status 1
fn load_config(path: Option<&Path>) -> AppConfig {
    let result = match path {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    };
    match result {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => {
            // Only offer to create the file at the standard location
            let prompt = if path == Path::new(CONFIG_PATH) {
                AppConfig::prompt_create_config()
            } else {
                Ok(None)
            };
            match prompt {
                Ok(Some(created_path)) => {
                    println!("Created default configuration file at: {}", created_path.display());
                    println!("   Edit this file to customize settings, then run clinicscan again.");
                    std::process::exit(0);
                }
                Ok(None) => {
                    eprintln!("Configuration file not found at: {}", path.display());
                    eprintln!("   Run with --init to create a default configuration file.");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Failed to create configuration file: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

fn export_logs(logger: &ScanLogger) {
    if let Err(e) = logger.export_logs() {
        eprintln!("Warning: Failed to export logs: {:#}", e);
    }
}
