//! Concurrency gate for headless Chrome processes.
//!
//! Each Chrome process consumes ~100-300 MB RAM, so the number of live
//! browsers is capped independently of the site concurrency limit.
//!
//! Uses std::sync primitives so it works inside spawn_blocking closures.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Default cap on simultaneous Chrome instances
pub const DEFAULT_MAX_BROWSER_INSTANCES: usize = 4;

const FIRST_DEBUG_PORT: u16 = 9222;
const LAST_DEBUG_PORT: u16 = 9322;

/// Unique debug port per browser instance, wrapping within a fixed range
static PORT_COUNTER: AtomicU16 = AtomicU16::new(FIRST_DEBUG_PORT);

/// A simple counting semaphore. Unlike tokio::sync::Semaphore, this works
/// in synchronous contexts.
#[derive(Debug)]
pub struct BrowserPool {
    state: Mutex<usize>,
    condvar: Condvar,
    max: usize,
}

impl BrowserPool {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(0),
            condvar: Condvar::new(),
            max: max.max(1),
        })
    }

    /// Acquire a permit, blocking until one is available.
    pub fn acquire(self: &Arc<Self>) -> BrowserPermit {
        let mut count = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while *count >= self.max {
            count = self
                .condvar
                .wait(count)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *count += 1;
        BrowserPermit { pool: Arc::clone(self) }
    }

    /// Permits currently held
    pub fn in_use(&self) -> usize {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self) {
        let mut count = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *count = count.saturating_sub(1);
        self.condvar.notify_one();
    }
}

/// RAII guard that releases a pool permit on drop.
#[derive(Debug)]
pub struct BrowserPermit {
    pool: Arc<BrowserPool>,
}

impl Drop for BrowserPermit {
    fn drop(&mut self) {
        self.pool.release();
    }
}

/// A Chrome browser instance with an attached pool permit.
/// Dropping the guard kills the Chrome process and frees the permit.
pub struct BrowserGuard {
    pub browser: headless_chrome::Browser,
    _permit: BrowserPermit,
}

/// Launch a headless Chrome browser, gated by `pool`.
///
/// Sandbox is disabled inside containers (detected via /.dockerenv or the
/// CLINICSCAN_CONTAINER env var). CHROME_PATH overrides binary discovery.
pub fn launch_browser(pool: &Arc<BrowserPool>) -> anyhow::Result<BrowserGuard> {
    let permit = pool.acquire();

    let is_container =
        std::env::var("CLINICSCAN_CONTAINER").is_ok() || Path::new("/.dockerenv").exists();

    let chrome_path: Option<PathBuf> = std::env::var("CHROME_PATH").ok().map(PathBuf::from);

    let debug_port = PORT_COUNTER.fetch_add(1, Ordering::Relaxed);
    if debug_port > LAST_DEBUG_PORT {
        PORT_COUNTER.store(FIRST_DEBUG_PORT, Ordering::Relaxed);
    }

    let options = headless_chrome::LaunchOptions::default_builder()
        .sandbox(!is_container)
        .path(chrome_path)
        .port(Some(debug_port))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build Chrome launch options: {}", e))?;

    let browser = headless_chrome::Browser::new(options)
        .map_err(|e| anyhow::anyhow!("Failed to launch headless Chrome: {}", e))?;

    Ok(BrowserGuard {
        browser,
        _permit: permit,
    })
}
