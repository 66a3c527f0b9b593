//! Batch supervisor over a CSV sheet and the scripted browser.

mod common;

use clinicscan::batch::{run_batch, BatchOptions};
use clinicscan::browser::{ScriptedDriver, SessionSettings};
use clinicscan::email_provider::StaticMxResolver;
use clinicscan::logger::{ScanLogger, VerbosityLevel};
use clinicscan::sheet::{column_index, CsvSheet, SheetBackend};
use clinicscan::visitor::VisitSettings;
use clinicscan::{ScanSettings, SignatureCatalog, SiteScanner};
use common::fixtures::load_fixture;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;

const SHEET: &str = "website_url,clinic_name,scraping_date
https://alpha.test,,
https://beta.test,Beta Clinic,2026-10-01 09:00:00
https://gamma.test,,
";

fn write_sheet(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("clinics.csv");
    std::fs::write(&path, SHEET).unwrap();
    path
}

fn driver() -> ScriptedDriver {
    ScriptedDriver::new()
        .page("https://alpha.test/", load_fixture("sites/physio_multi_home.html"))
        .page("https://beta.test/", load_fixture("sites/cliniko_dental_home.html"))
        .timeout("https://gamma.test/")
}

fn scanner(driver: ScriptedDriver) -> Arc<SiteScanner> {
    let settings = ScanSettings {
        visit: VisitSettings {
            homepage_timeout: Duration::from_secs(2),
            subpage_timeout: Duration::from_millis(300),
            homepage_settle: Duration::ZERO,
            subpage_settle: Duration::ZERO,
            max_pages: 3,
        },
        session: SessionSettings::default(),
        site_budget: Duration::from_secs(15),
        robots_timeout: Duration::from_millis(200),
    };
    Arc::new(SiteScanner::new(
        Arc::new(SignatureCatalog::builtin().unwrap()),
        Arc::new(driver),
        reqwest::Client::new(),
        Arc::new(StaticMxResolver::new()),
        settings,
    ))
}

fn options() -> BatchOptions {
    BatchOptions {
        concurrency: 2,
        ..BatchOptions::default()
    }
}

fn logger() -> Arc<ScanLogger> {
    Arc::new(ScanLogger::new(VerbosityLevel::Silent))
}

fn read_back(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let sheet = CsvSheet::open(path).unwrap();
    (sheet.headers().to_vec(), sheet.read_rows().unwrap())
}

#[tokio::test]
async fn test_scanned_rows_are_written_once_and_timestamped() {
    let dir = TempDir::new().unwrap();
    let path = write_sheet(&dir);
    let driver = driver();
    let sheet = Arc::new(Mutex::new(CsvSheet::open(&path).unwrap()));

    let summary = run_batch(scanner(driver.clone()), sheet, &options(), logger()).await.unwrap();

    assert_eq!(summary.total_rows, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.write_failures, 0);
    assert!(summary.site_results.iter().all(|r| r.written));
    assert!(!driver.visits().iter().any(|u| u.contains("beta.test")));

    let (headers, rows) = read_back(&path);
    let date = column_index(&headers, "scraping_date").unwrap();
    let error = column_index(&headers, "error_log").unwrap();
    let name = column_index(&headers, "clinic_name").unwrap();

    assert_eq!(rows[0][0], "https://alpha.test");
    assert!(!rows[0][date].is_empty());
    assert_eq!(rows[0][error], "");
    assert_eq!(rows[0][name], "Move Well Physiotherapy");

    assert_eq!(rows[1][name], "Beta Clinic");
    assert_eq!(rows[1][date], "2026-10-01 09:00:00");

    assert!(!rows[2][date].is_empty());
    assert_eq!(rows[2][error], "Timeout loading homepage");
}

#[tokio::test]
async fn test_second_run_resumes_without_rescanning() {
    let dir = TempDir::new().unwrap();
    let path = write_sheet(&dir);

    let sheet = Arc::new(Mutex::new(CsvSheet::open(&path).unwrap()));
    run_batch(scanner(driver()), sheet, &options(), logger()).await.unwrap();
    let (_, first_rows) = read_back(&path);

    let driver = driver();
    let sheet = Arc::new(Mutex::new(CsvSheet::open(&path).unwrap()));
    let summary = run_batch(scanner(driver.clone()), sheet, &options(), logger()).await.unwrap();

    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.scanned, 0);
    assert!(driver.visits().is_empty());
    let (_, second_rows) = read_back(&path);
    assert_eq!(first_rows, second_rows);
}

#[tokio::test]
async fn test_interrupt_stops_scheduling() {
    let dir = TempDir::new().unwrap();
    let path = write_sheet(&dir);
    let driver = driver();
    let options = options();
    options.interrupted.store(true, Ordering::SeqCst);

    let sheet = Arc::new(Mutex::new(CsvSheet::open(&path).unwrap()));
    let summary = run_batch(scanner(driver.clone()), sheet, &options, logger()).await.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.scanned, 0);
    assert!(driver.visits().is_empty());

    let (headers, rows) = read_back(&path);
    let date = column_index(&headers, "scraping_date").unwrap();
    assert_eq!(rows[0][date], "");
    assert_eq!(rows[2][date], "");
}

#[tokio::test]
async fn test_empty_sheet_is_a_setup_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "website_url,scraping_date\n").unwrap();

    let sheet = Arc::new(Mutex::new(CsvSheet::open(&path).unwrap()));
    let interrupted = Arc::new(AtomicBool::new(false));
    let options = BatchOptions {
        interrupted,
        ..BatchOptions::default()
    };
    let result = run_batch(scanner(ScriptedDriver::new()), sheet, &options, logger()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_interrupted_sheet_with_url_column_resumes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clinics.csv");
    std::fs::write(&path, "name,url\nAlpha,https://alpha.test\nBeta,https://beta.test\n").unwrap();
    let options = BatchOptions {
        url_column: 1,
        ..options()
    };

    // First run is interrupted before anything is scanned
    options.interrupted.store(true, Ordering::SeqCst);
    let sheet = Arc::new(Mutex::new(CsvSheet::open(&path).unwrap()));
    let summary = run_batch(scanner(driver()), sheet, &options, logger()).await.unwrap();
    assert_eq!(summary.scanned, 0);

    let (headers, rows) = read_back(&path);
    assert_eq!(column_index(&headers, "website_url"), Some(0));
    assert_eq!(rows[0][0], "https://alpha.test");
    assert_eq!(rows[1][0], "https://beta.test");

    // Second run picks both rows up from the rewritten layout
    options.interrupted.store(false, Ordering::SeqCst);
    let driver = driver();
    let sheet = Arc::new(Mutex::new(CsvSheet::open(&path).unwrap()));
    let summary = run_batch(scanner(driver.clone()), sheet, &options, logger()).await.unwrap();

    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.scanned, 2);
    assert!(driver.visits().iter().any(|u| u.contains("alpha.test")));
    assert!(driver.visits().iter().any(|u| u.contains("beta.test")));

    let (headers, rows) = read_back(&path);
    let date = column_index(&headers, "scraping_date").unwrap();
    let name = column_index(&headers, "name").unwrap();
    assert!(rows.iter().all(|row| !row[date].is_empty()));
    assert_eq!(rows[0][name], "Alpha");
}
