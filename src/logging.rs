use chrono::Local;
use log::{LevelFilter, SetLoggerError};
use std::io::Write;

/// Timestamp layout used for every log line.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Installs the process-wide logger.
///
/// `level` is the default filter; `RUST_LOG` takes precedence when set so a
/// single module can be turned up without touching the config file.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().format(TIMESTAMP_FORMAT),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()
}

/// Maps a config string onto a level filter, falling back to `Info`.
pub fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}
