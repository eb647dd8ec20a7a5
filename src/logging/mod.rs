//! Tracing setup for the development backend and embedding editors.
//!
//! Console output is pretty in development and JSON in production. Every
//! event is also appended to a daily-rotated file under [`LogSettings::dir`];
//! production additionally splits errors into their own file.

pub mod middleware;

use std::path::PathBuf;

use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub dir: PathBuf,
    pub level: String,
    pub json: bool,
}

impl LogSettings {
    /// `LOG_DIR` and `LOG_LEVEL` override the per-environment defaults.
    pub fn for_environment(environment: &str) -> Self {
        let production = environment == "production";
        Self {
            dir: std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),
            level: std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| if production { "info" } else { "debug" }.to_string()),
            json: production,
        }
    }

    /// Directive used when `RUST_LOG` is unset.
    pub fn directive(&self) -> String {
        format!(
            "portfolio_builder={level},tower_http={level},axum=info",
            level = self.level
        )
    }
}

/// Install the global subscriber.
///
/// The returned guards flush the background writers; hold them until the
/// process exits.
pub fn init(environment: &str) -> Vec<WorkerGuard> {
    let settings = LogSettings::for_environment(environment);

    if let Err(e) = std::fs::create_dir_all(&settings.dir) {
        eprintln!("cannot create log dir {}: {e}", settings.dir.display());
    }

    let (file_writer, file_guard) = non_blocking(rolling::daily(&settings.dir, "backend.log"));
    let (console_writer, console_guard) = non_blocking(std::io::stdout());
    let mut guards = vec![file_guard, console_guard];

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.directive()));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if settings.json {
        let (error_writer, error_guard) =
            non_blocking(rolling::daily(&settings.dir, "backend-error.log"));
        guards.push(error_guard);

        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(file_writer)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(
                fmt::layer()
                    .json()
                    .with_writer(error_writer)
                    .with_filter(LevelFilter::ERROR),
            )
            .with(fmt::layer().json().with_writer(console_writer).with_target(false))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(file_writer).with_ansi(false))
            .with(fmt::layer().with_writer(console_writer).pretty())
            .try_init()
    };

    // A host process or test may have installed its own subscriber first.
    if let Err(e) = installed {
        eprintln!("logging already initialized: {e}");
    }

    tracing::info!(
        environment = %environment,
        dir = %settings.dir.display(),
        json = settings.json,
        "logging initialized"
    );
    guards
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_scopes_crate_and_http_layers() {
        let settings = LogSettings {
            dir: PathBuf::from("logs"),
            level: "warn".into(),
            json: false,
        };
        assert_eq!(
            settings.directive(),
            "portfolio_builder=warn,tower_http=warn,axum=info"
        );
    }
}
