//! Log output.
//!
//! The terminal belongs to the dashboard, so logs go to a file or nowhere.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Default directive when neither `OPWATCH_LOG` nor `RUST_LOG` is set.
const DEFAULT_FILTER: &str = "warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("OPWATCH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// With a path, events are appended to that file without ANSI colours.
/// Without one, they are discarded.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let filter = env_filter();
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritable_log_path_is_reported() {
        let err = init(Some(Path::new("/nonexistent/dir/opwatch.log"))).unwrap_err();
        assert!(err.to_string().contains("opening log file"));
    }
}
