//! Batch supervisor: schedules pending sheet rows across a bounded number
//! of concurrent site scans and persists each record exactly once.
//!
//! - Rows with a resume timestamp are skipped before scheduling
//! - Every scanned row is written with a fresh timestamp, failed or not
//! - Sheet writes are serialized behind one mutex
//! - An interrupt stops scheduling; scans in flight finish and persist

use crate::logger::ScanLogger;
use crate::orchestrator::SiteScanner;
use crate::record::{QualificationRecord, SCRAPING_DATE_COLUMN};
use crate::sheet::{self, SheetBackend};
use anyhow::{bail, Result};
use chrono::Utc;
use futures::{stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info};

/// Format of the resume timestamp written to every scanned row
pub const SCRAPING_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A sheet row still waiting to be scanned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSite {
    /// Data row index (0-based, below the header)
    pub row_index: usize,
    /// URL cell as written in the sheet
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub concurrency: usize,
    /// Column holding the site URL in the input layout. Once the sheet
    /// carries the output header the URL is its first column.
    pub url_column: usize,
    pub resume_column: String,
    /// Set by the Ctrl+C handler
    pub interrupted: Arc<AtomicBool>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            url_column: 0,
            resume_column: SCRAPING_DATE_COLUMN.to_string(),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Outcome of one scheduled row
#[derive(Debug, Clone)]
pub struct SiteOutcome {
    pub row_index: usize,
    pub url: String,
    /// `None` when the row was never scanned (interrupt)
    pub record: Option<QualificationRecord>,
    pub written: bool,
    pub duration_secs: f64,
}

/// Summary of a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// Data rows in the sheet
    pub total_rows: usize,
    /// Rows already carrying a resume timestamp, or without a URL
    pub skipped: usize,
    pub scanned: usize,
    pub successful: usize,
    /// Scanned rows whose record carries an error
    pub failed: usize,
    pub write_failures: usize,
    pub interrupted: bool,
    pub total_duration_secs: f64,
    pub started_at: String,
    pub completed_at: String,
    pub site_results: Vec<SiteOutcome>,
}

/// Rows with a URL and an empty resume cell, in sheet order
pub fn pending_sites(
    headers: &[String],
    rows: &[Vec<String>],
    url_column: usize,
    resume_column: &str,
) -> Vec<PendingSite> {
    let resume_idx = sheet::column_index(headers, resume_column);
    rows.iter()
        .enumerate()
        .filter_map(|(row_index, row)| {
            let url = row.get(url_column).map(|c| c.trim()).unwrap_or_default();
            if url.is_empty() {
                return None;
            }
            let already_scanned = resume_idx
                .and_then(|idx| row.get(idx))
                .map_or(false, |cell| !cell.trim().is_empty());
            if already_scanned {
                return None;
            }
            Some(PendingSite {
                row_index,
                url: url.to_string(),
            })
        })
        .collect()
}

pub fn new_batch_summary() -> BatchSummary {
    BatchSummary {
        started_at: Utc::now().to_rfc3339(),
        ..BatchSummary::default()
    }
}

/// Tally per-site outcomes and stamp the completion time
pub fn finalize_batch_summary(summary: &mut BatchSummary) {
    summary.scanned = summary.site_results.iter().filter(|r| r.record.is_some()).count();
    summary.failed = summary
        .site_results
        .iter()
        .filter(|r| r.record.as_ref().map_or(false, |rec| rec.error.is_some()))
        .count();
    summary.successful = summary.scanned - summary.failed;
    summary.write_failures = summary
        .site_results
        .iter()
        .filter(|r| r.record.is_some() && !r.written)
        .count();
    summary.completed_at = Utc::now().to_rfc3339();
}

/// Scan every pending row of `sheet`. Only setup problems (unreadable
/// sheet, no rows) are errors; site failures land in their rows.
pub async fn run_batch<S>(
    scanner: Arc<SiteScanner>,
    sheet: Arc<Mutex<S>>,
    options: &BatchOptions,
    logger: Arc<ScanLogger>,
) -> Result<BatchSummary>
where
    S: SheetBackend + 'static,
{
    let mut summary = new_batch_summary();
    let batch_start = std::time::Instant::now();

    let pending = {
        let mut guard = sheet.lock().await;
        if guard.read_rows()?.is_empty() {
            bail!("No rows found in sheet");
        }
        guard.ensure_headers(&QualificationRecord::sheet_headers(), options.url_column)?;

        // Laid out under the output header, the URL is the first column
        let headers = guard.headers().to_vec();
        let rows = guard.read_rows()?;
        summary.total_rows = rows.len();
        pending_sites(&headers, &rows, 0, &options.resume_column)
    };
    summary.skipped = summary.total_rows - pending.len();

    logger.info(&format!(
        "{} rows, {} already scanned, {} to scan ({} at a time)",
        summary.total_rows,
        summary.skipped,
        pending.len(),
        options.concurrency
    ));

    let total = pending.len();
    logger.start_progress(total as u64).await;

    let concurrency = options.concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));

    let site_stream = stream::iter(pending.into_iter().enumerate().map(|(index, site)| {
        let semaphore = semaphore.clone();
        let scanner = scanner.clone();
        let sheet = sheet.clone();
        let logger = logger.clone();
        let interrupted = options.interrupted.clone();

        async move {
            let not_scanned = SiteOutcome {
                row_index: site.row_index,
                url: site.url.clone(),
                record: None,
                written: false,
                duration_secs: 0.0,
            };
            if interrupted.load(Ordering::SeqCst) {
                return not_scanned;
            }
            let Ok(_permit) = semaphore.acquire().await else {
                return not_scanned;
            };
            if interrupted.load(Ordering::SeqCst) {
                return not_scanned;
            }

            logger.log_site_start(index, total, &site.url);
            logger.update_progress(&site.url).await;
            let site_start = std::time::Instant::now();

            let mut record = scanner.scan(&site.url).await;
            record.url = site.url.clone();
            record.scraping_date = Utc::now().format(SCRAPING_DATE_FORMAT).to_string();
            let duration_secs = site_start.elapsed().as_secs_f64();

            let written = {
                let mut guard = sheet.lock().await;
                match guard.write_row(site.row_index, &record.to_row()) {
                    Ok(()) => true,
                    Err(e) => {
                        logger.log_write_failed(&site.url, &e);
                        false
                    }
                }
            };

            logger.log_site_result(&record, duration_secs);
            logger.advance_progress().await;

            SiteOutcome {
                row_index: site.row_index,
                url: site.url,
                record: Some(record),
                written,
                duration_secs,
            }
        }
    }));

    let results: Vec<SiteOutcome> = site_stream.buffer_unordered(concurrency).collect().await;

    summary.interrupted = options.interrupted.load(Ordering::SeqCst);
    summary.site_results = results;
    summary.total_duration_secs = batch_start.elapsed().as_secs_f64();
    finalize_batch_summary(&mut summary);

    logger
        .finish_progress(&format!(
            "Batch complete: {} scanned, {} failed",
            summary.scanned, summary.failed
        ))
        .await;
    info!(
        "Batch finished in {:.1}s ({} scanned, {} skipped)",
        summary.total_duration_secs, summary.scanned, summary.skipped
    );
    debug!("Batch started {} completed {}", summary.started_at, summary.completed_at);

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_pending_skips_scanned_and_blank_rows() {
        let headers = strings(&["website_url", "clinic_name", "scraping_date"]);
        let rows = vec![
            strings(&["https://a.test", "", ""]),
            strings(&["https://b.test", "B", "2026-10-01 09:00:00"]),
            strings(&["", "", ""]),
            strings(&["c.test"]),
        ];
        let pending = pending_sites(&headers, &rows, 0, "scraping_date");
        assert_eq!(
            pending,
            vec![
                PendingSite { row_index: 0, url: "https://a.test".into() },
                PendingSite { row_index: 3, url: "c.test".into() },
            ]
        );
    }

    #[test]
    fn test_pending_without_resume_column() {
        let headers = strings(&["url"]);
        let rows = vec![strings(&["a.test"]), strings(&["b.test"])];
        assert_eq!(pending_sites(&headers, &rows, 0, "scraping_date").len(), 2);
    }

    #[test]
    fn test_finalize_counts() {
        let mut summary = new_batch_summary();
        let ok = QualificationRecord::new("https://a.test/");
        let failed = QualificationRecord::failed("https://b.test/", "Timeout loading homepage");
        summary.site_results = vec![
            SiteOutcome { row_index: 0, url: "a".into(), record: Some(ok), written: true, duration_secs: 1.0 },
            SiteOutcome { row_index: 1, url: "b".into(), record: Some(failed), written: false, duration_secs: 1.0 },
            SiteOutcome { row_index: 2, url: "c".into(), record: None, written: false, duration_secs: 0.0 },
        ];
        finalize_batch_summary(&mut summary);
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.write_failures, 1);
        assert!(!summary.completed_at.is_empty());
    }
}
