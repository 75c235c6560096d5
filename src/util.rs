use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Install the global `tracing` subscriber once. `RUST_LOG` wins over `default_level`.
pub fn init_tracing_once_with(default_level: &str) {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .try_init();
    });
}

pub fn init_tracing_once() {
    init_tracing_once_with("info");
}

// -------- robust open/create with backoff (Windows-friendly) --------

/// Return true for transient/retriable I/O errors often seen on Windows when
/// filter drivers (AV/backup), USB/NAS volumes, or sharing violations occur.
fn is_retriable_io_error(e: &io::Error) -> bool {
    match e.raw_os_error() {
        // Common Windows transient codes:
        //   5   = Access is denied (often AV/share)
        //   32  = Sharing violation
        //   33  = Lock violation
        //   21  = Device not ready
        //   1117= I/O device error
        Some(5) | Some(32) | Some(33) | Some(21) | Some(1117) => true,
        _ => false,
    }
}

fn with_backoff(tries: usize, delay_ms: u64, what: &str, mut op: impl FnMut() -> io::Result<File>) -> io::Result<File> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match op() {
            Ok(f) => return Ok(f),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, format!("{what} failed"))))
}

/// Open a file for reading with retries/backoff for transient errors.
pub fn open_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, "open", || File::open(path))
}

/// Create (truncate) a file with retries/backoff for transient errors.
pub fn create_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, "create", || File::create(path))
}

/// Open a file in append mode (creating it) with retries/backoff for transient errors.
pub fn append_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, "append", || {
        OpenOptions::new().create(true).append(true).open(path)
    })
}
