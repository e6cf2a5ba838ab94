//! Tracing initialisation for programs embedding the regression engine.
//!
//! [`init_tracing`] installs a global subscriber filtered to the engine's own
//! crates at the verbosity the run asks for. `RUST_LOG` overrides the filter.
//! Later calls are ignored.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::RegressionConfig;

const ENGINE_TARGETS: &[&str] = &["regcorr_core", "regcorr_state"];

/// Line format of emitted events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON.
    Json,
}

/// Default level for a run: `debug` when verbose, `info` otherwise.
pub fn level_for(config: &RegressionConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// `EnvFilter` directive enabling the engine's targets at the run's level.
pub fn filter_directive(config: &RegressionConfig) -> String {
    let level = level_for(config).as_str().to_ascii_lowercase();
    ENGINE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialise the global tracing subscriber for `config`.
pub fn init_tracing(config: &RegressionConfig, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_target(false).json())
            .try_init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init(),
    };
    if installed.is_ok() {
        tracing::debug!(run = %config.run_name, ?format, "tracing initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn config() -> RegressionConfig {
        RegressionConfig::new(
            "main_site-a",
            PipelineConfig::new("pipeline_1", "/runs/v1"),
            PipelineConfig::new("pipeline_2", "/runs/v2"),
            "/tmp/cache",
        )
    }

    #[test]
    fn verbose_run_filters_at_debug() {
        let mut config = config();
        assert_eq!(level_for(&config), Level::INFO);
        assert_eq!(
            filter_directive(&config),
            "regcorr_core=info,regcorr_state=info"
        );
        config.verbose = true;
        assert_eq!(level_for(&config), Level::DEBUG);
        assert_eq!(
            filter_directive(&config),
            "regcorr_core=debug,regcorr_state=debug"
        );
    }

    #[test]
    fn init_twice_is_harmless() {
        init_tracing(&config(), LogFormat::Text);
        init_tracing(&config(), LogFormat::Json);
    }
}
