use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "clinicscan")]
#[command(about = "Fingerprints clinic websites and writes qualification rows back to the sheet")]
#[command(version)]
pub struct Args {
    /// Create default configuration file at ./config/clinicscan.toml
    #[arg(long)]
    pub init: bool,

    /// Configuration file (defaults to ./config/clinicscan.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Sheet CSV to scan (overrides [sheet].path)
    #[arg(short, long, value_name = "PATH")]
    pub sheet: Option<PathBuf>,

    /// Sites scanned at once (overrides [scan].concurrency)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Verbose logging (use -v for per-site tech summaries, -vv for DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Export execution logs to a file (specify file path)
    #[arg(long)]
    pub log_file: Option<String>,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == Some(0) {
            return Err("--concurrency must be at least 1".to_string());
        }
        Ok(())
    }

    /// `tracing` filter used when RUST_LOG is unset
    pub fn default_log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "clinicscan=info,warn",
            _ => "clinicscan=debug,info",
        }
    }
}
