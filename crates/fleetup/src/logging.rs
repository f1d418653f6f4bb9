#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only log file kept under a size budget for the whole life of the
/// process, not only at startup. Once a write pushes it past the budget the
/// file is cut down to its newest half on a line boundary. A file rotated
/// away or deleted underneath us is recreated on the next write.
struct BoundedLogFile {
    path: PathBuf,
    file: File,
    len: u64,
    max_len: u64,
}

impl BoundedLogFile {
    fn open(path: PathBuf, max_len: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        keep_newest_half_if_over(&path, max_len)?;
        let file = open_append(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            len,
            max_len,
        })
    }

    fn reopen(&mut self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.file = open_append(&self.path)?;
        self.len = self.file.metadata()?.len();
        Ok(())
    }
}

impl Write for BoundedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.path.exists() {
            self.reopen()?;
        }

        let written = self.file.write(buf)?;
        self.len += written as u64;

        if self.len > self.max_len {
            self.file.flush()?;
            keep_newest_half_if_over(&self.path, self.max_len)?;
            self.reopen()?;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn keep_newest_half_if_over(path: &Path, max_len: u64) -> io::Result<()> {
    let contents = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error),
    };
    if contents.len() as u64 <= max_len {
        return Ok(());
    }

    let half = contents.len() / 2;
    let keep_from = contents[half..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(half, |pos| half + pos + 1);
    std::fs::write(path, &contents[keep_from..])
}

fn level_for(debug_enabled: bool) -> LevelFilter {
    if debug_enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Records already carry their own `[update]` style prefix, so only the
/// timestamp and level are added in front of them.
fn record_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_location_level(LevelFilter::Off)
        .add_filter_allow_str("fleetup")
        .build()
}

pub fn init_logging(log_path: &Path, debug_enabled: bool, max_log_size: u64) {
    let level = level_for(debug_enabled);
    let config = record_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));

    match BoundedLogFile::open(log_path.to_path_buf(), max_log_size) {
        Ok(file) => loggers.push(WriteLogger::new(level, config, file)),
        Err(error) => eprintln!("fleetup: cannot log to {}: {error}", log_path.display()),
    }

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
    log::set_max_level(level);

    log::debug!(
        "[update] logging to {} (budget {max_log_size} bytes)",
        log_path.display()
    );
}
