//! File logging for competitions.
//!
//! [`init_logger`] installs a global `tracing` subscriber writing every event, down to
//! `TRACE`, to a timestamped file in the given directory. It can only succeed once per
//! process: later calls fail because a global subscriber is already set.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::Context;
use time::{format_description::parse, OffsetDateTime, UtcOffset};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{
    fmt::{time::OffsetTime, writer::BoxMakeWriter},
    FmtSubscriber,
};

/// Install a subscriber writing to `<dir>/<date>_<time>_arena_log.txt` and return that path.
///
/// # Errors
/// Fails if the directory or the file cannot be created, or if a global subscriber is
/// already installed.
pub fn init_logger(dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("cannot create log directory {}", dir.display()))?;
    let path = dir.join(log_file_name()?);
    let file = File::create(&path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(
        offset,
        parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .context("invalid timestamp format")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(BoxMakeWriter::new(file))
        .finish();

    set_global_default(subscriber)
        .context("a global tracing subscriber is already set, disable log_dir or drop yours")?;
    Ok(path)
}

fn log_file_name() -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]-[minute]-[second]_arena_log.txt")
        .context("invalid log file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).context("cannot format log file name")
}
