//! A hand-rolled `log::Log` backend, in the spirit of
//! `uefi-loader::logger::UefiLogger` and `kernel-qemu::logger` — a plain
//! stderr writer rather than pulling in an external logging-backend crate.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        // The real filtering happens via `log::set_max_level` in `init`;
        // the macros already skip calling `log` at all above that level.
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = writeln!(
            std::io::stderr(),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: StderrLogger = StderrLogger;

/// Install the stderr logger at `max_level`. Call once, at process start.
///
/// # Errors
/// Returns [`SetLoggerError`] if a logger was already installed.
pub fn init(max_level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(max_level);
    Ok(())
}
