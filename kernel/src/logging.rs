//! Kernel logging over COM1
//!
//! Backs the `log` facade. Debug builds log at `Debug`, release builds at
//! `Info`.

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

pub static LOGGER: Logger = Logger::new();

/// Serializes whole records so lines from nested traps do not interleave.
pub struct Logger {
    inner: Mutex<()>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    pub const fn new() -> Logger {
        Logger {
            inner: Mutex::new(()),
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    /// Formats records as `[LEVEL] target: message`.
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _guard = self.inner.lock();
            crate::serial_println!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Installs [`LOGGER`]. Calling it twice keeps the first logger.
pub fn init() {
    let installed = log::set_logger(&LOGGER);
    if installed.is_ok() {
        log::set_max_level(if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        });
    }
}
