//! stderr output plus an optional append-only log file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::cli::CliArgs;
use crate::error::AppError;

/// Installs the global subscriber. The returned guard flushes the log file on
/// drop and must live until the process exits.
pub fn init(cli_args: &CliArgs) -> Result<Option<WorkerGuard>, AppError> {
    // Without --log only errors reach stderr; RUST_LOG wins when set.
    let console_filter = if cli_args.log {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli_args.log_level))
    } else {
        EnvFilter::new("error")
    };
    let console_layer = fmt::Layer::new()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let (file_layer, guard) = match &cli_args.log_file {
        Some(path) => {
            let (dir, file_name) = split_log_path(path)?;
            std::fs::create_dir_all(&dir)?;
            let (writer, guard) = non_blocking(rolling::never(&dir, file_name));
            let layer = fmt::Layer::new()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(&cli_args.log_level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::InputFormatError(format!("logging already initialized: {e}")))?;

    Ok(guard)
}

/// Directory and file name of a log path; a bare file name lands in the working directory.
pub fn split_log_path(path: &Path) -> Result<(PathBuf, OsString), AppError> {
    let file_name = path.file_name().ok_or_else(|| {
        AppError::InputFormatError(format!("log file {} has no file name", path.display()))
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name.to_os_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_splits_into_directory_and_name() {
        let (dir, name) = split_log_path(Path::new("logs/run.log")).unwrap();
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(name, OsString::from("run.log"));
    }

    #[test]
    fn bare_log_name_uses_the_working_directory() {
        let (dir, name) = split_log_path(Path::new("run.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, OsString::from("run.log"));
    }

    #[test]
    fn log_path_needs_a_file_name() {
        assert!(matches!(
            split_log_path(Path::new("logs/..")),
            Err(AppError::InputFormatError(_))
        ));
    }
}
