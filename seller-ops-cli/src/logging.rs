//! Logger setup: `timestamp - LEVEL - message` to stderr and a per-job file

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::LoggingConfig;

/// Writes everything to both sinks
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.first.write_all(buf)?;
        self.second.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}

/// `<dir>/<job>.log`
pub fn log_file_path(dir: &Path, job: &str) -> PathBuf {
    dir.join(format!("{}.log", job))
}

/// Install the global logger for `job`. `RUST_LOG` overrides the configured level.
/// Returns the log file path.
pub fn init(config: &LoggingConfig, job: &str) -> Result<PathBuf> {
    fs::create_dir_all(&config.dir)
        .with_context(|| format!("Failed to create log directory: {}", config.dir.display()))?;

    let path = log_file_path(&config.dir, job);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    let env = env_logger::Env::default().default_filter_or(config.level.as_str());
    env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(Tee::new(io::stderr(), file))))
        .try_init()
        .context("Logger already initialised")?;

    Ok(path)
}
