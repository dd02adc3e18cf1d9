use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::warn;

use crate::{config::GlobalsConfig, sequence::ImageSequence};

/// Where a sequence's movie and companion log will land
#[derive(Debug, Clone)]
pub struct MoviePlan {
    pub movie_path: PathBuf,
    pub log_path: PathBuf,
    pub basename: String,
}

/// Derive the output movie path for a sequence:
/// `<location>/<basename>_<DD_MM_YYYY_HH_MM>_<slate_type>.<ext>`, with the
/// companion log next to it
pub fn plan_movie_output(
    sequence: &ImageSequence,
    globals: &GlobalsConfig,
    profile_ext: &str,
    now: DateTime<Local>,
) -> MoviePlan {
    let ext = globals.movie_ext.as_deref().unwrap_or(profile_ext);
    let stamp = now.format("%d_%m_%Y_%H_%M");
    let basename = format!("{}_{}_{}", sequence.basename(), stamp, globals.slate_type);

    let location = resolve_movie_location(&globals.movie_location, sequence.directory());
    let movie_path = location.join(format!("{basename}.{ext}"));
    let log_path = movie_path.with_extension("log");

    MoviePlan {
        movie_path,
        log_path,
        basename,
    }
}

/// Resolve the configured movie location: absolute paths and plain names are
/// used as-is, `~` expands to the home directory, and `.`/`..` are taken
/// relative to the sequence's own directory
fn resolve_movie_location(location: &str, sequence_dir: &Path) -> PathBuf {
    if location.starts_with('/') {
        PathBuf::from(location)
    } else if let Some(rest) = location.strip_prefix('~') {
        match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => {
                warn!("Could not resolve home directory for movie location '{location}'");
                PathBuf::from(location)
            }
        }
    } else if location.starts_with('.') {
        sequence_dir.join(location)
    } else {
        PathBuf::from(location)
    }
}

/// Plain-text per-run log written next to the movie, truncated when it
/// already exists
pub struct RunLog {
    writer: Option<BufWriter<File>>,
    debug: bool,
}

impl RunLog {
    pub fn create(path: &Path, debug: bool) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            debug,
        })
    }

    /// A log that swallows everything, for when the log file could not be
    /// created; the run itself is never blocked on its log
    pub fn disabled(debug: bool) -> Self {
        Self {
            writer: None,
            debug,
        }
    }

    pub fn info(&mut self, message: &str) {
        self.write("INFO", message);
    }

    pub fn warn(&mut self, message: &str) {
        self.write("WARNING", message);
    }

    pub fn error(&mut self, message: &str) {
        self.write("ERROR", message);
    }

    pub fn debug(&mut self, message: &str) {
        if self.debug {
            self.write("DEBUG", message);
        }
    }

    fn write(&mut self, level: &str, message: &str) {
        if let Some(writer) = self.writer.as_mut() {
            let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S");
            let _ = writeln!(writer, "{level}\t {timestamp} \t{message}");
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.flush();
    }
}
