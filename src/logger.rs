use crate::batch::BatchSummary;
use crate::catalog::{Category, NOT_DETECTED};
use crate::record::QualificationRecord;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,   // Progress bar and final summary only
    Summary = 1,  // One line per site (default)
    Detailed = 2, // Per-site tech summary, warnings
    Debug = 3,    // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }
}

/// User-facing run output. Lines print above the batch progress bar.
#[derive(Clone)]
pub struct ScanLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<String>,
}

impl ScanLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: String) -> Self {
        Self {
            log_file_path: Some(log_file_path),
            ..Self::new(verbosity)
        }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    /// Always shown, whatever the verbosity
    pub fn error(&self, message: &str) {
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", timestamp(), level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }
        eprintln!("{}", msg);
    }

    pub async fn start_progress(&self, total_sites: u64) {
        let pb = ProgressBar::new(total_sites);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| {
                    ProgressStyle::default_bar()
                        .template("{bar:40} {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                })
                .progress_chars("##-"),
        );
        if self.verbosity == VerbosityLevel::Silent && !atty::is(atty::Stream::Stderr) {
            pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        }
        pb.set_message("Starting...");

        let mut guard = self.progress_bar.write().await;
        *guard = Some(pb);
    }

    pub async fn update_progress(&self, message: &str) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.set_message(message.to_string());
        }
    }

    pub async fn advance_progress(&self) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc(1);
        }
    }

    pub async fn finish_progress(&self, final_message: &str) {
        let mut guard = self.progress_bar.write().await;
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
        drop(guard);
        self.info(final_message);
    }

    pub fn log_site_start(&self, index: usize, total: usize, url: &str) {
        self.debug(&format!("[{}/{}] Scanning {}", index + 1, total, url));
    }

    /// One line per finished site, plus the detected stack at Detailed
    pub fn log_site_result(&self, record: &QualificationRecord, duration_secs: f64) {
        match &record.error {
            Some(error) => self.info(&format!("{} - failed: {} ({:.1}s)", record.url, error, duration_secs)),
            None => self.info(&format!(
                "{} - {} | booking: {} ({:.1}s)",
                record.url, record.primary_category, record.booking_type, duration_secs
            )),
        }

        if self.verbosity >= VerbosityLevel::Detailed {
            for line in tech_summary(record) {
                self.print_message("INFO", &line);
            }
        }
    }

    pub fn log_write_failed(&self, url: &str, error: &anyhow::Error) {
        self.error(&format!("Failed to write row for {}: {:#}", url, error));
    }

    /// Printed regardless of verbosity
    pub fn print_final_summary(&self, summary: &BatchSummary) {
        println!("\n=== SCAN SUMMARY ===");
        println!("Duration:   {:.1}s", summary.total_duration_secs);
        println!("Rows:       {}", summary.total_rows);
        println!("Skipped:    {} (already scanned)", summary.skipped);
        println!("Scanned:    {}", summary.scanned);
        println!("Successful: {}", summary.successful);
        println!("Failed:     {}", summary.failed);
        if summary.write_failures > 0 {
            println!("Unwritten:  {}", summary.write_failures);
        }
        if summary.interrupted {
            println!("Interrupted: remaining rows were left for the next run");
        }
        println!("====================\n");
    }

    /// Write the buffered log lines to the configured file
    pub fn export_logs(&self) -> anyhow::Result<()> {
        let Some(ref log_file_path) = self.log_file_path else {
            return Ok(());
        };
        let Ok(buffer) = self.log_buffer.lock() else {
            return Ok(());
        };

        if let Some(parent) = Path::new(log_file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_file_path)?;
        for entry in buffer.iter() {
            writeln!(file, "{}", entry)?;
        }
        file.flush()?;
        Ok(())
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Detected categories of a record, one indented line each
pub fn tech_summary(record: &QualificationRecord) -> Vec<String> {
    let mut lines: Vec<String> = Category::ALL
        .iter()
        .filter(|c| record.has_tools(**c))
        .map(|c| format!("    {:<10} {}", c.as_str(), record.category_value(*c)))
        .collect();
    if record.booking_vendor != NOT_DETECTED && !record.booking_vendor.is_empty() {
        lines.push(format!("    {:<10} {}", "vendor", record.booking_vendor));
    }
    lines.push(format!("    {:<10} {}", "email", record.email_provider));
    lines
}
