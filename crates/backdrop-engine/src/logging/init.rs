use std::sync::Once;

/// Filter used when neither the config nor `RUST_LOG` names one.
///
/// Resource lifetimes (texture/program/mesh creation and release, mode switches)
/// are logged at `debug`; precondition violations at `error`.
pub const DEFAULT_FILTER: &str = "info";

/// How `init_logging` sets up `env_logger`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `env_logger` directives, e.g. `"backdrop_engine::gfx=debug"` to trace
    /// GPU object lifetimes. Overrides `RUST_LOG` when set.
    pub env_filter: Option<String>,

    /// Coloring of the output.
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

/// Picks the directives to install: the config's, then `RUST_LOG`'s, then
/// [`DEFAULT_FILTER`].
fn resolve_filter(configured: Option<String>, from_env: Option<String>) -> String {
    configured
        .or(from_env)
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

static INIT: Once = Once::new();

/// Installs `env_logger` as the `log` backend. Only the first call has any effect.
///
/// Hosts embedding the compositor usually own logging already; if a logger is
/// installed, it stays and this is a no-op.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = resolve_filter(config.env_filter, std::env::var("RUST_LOG").ok());

        let installed = env_logger::Builder::new()
            .parse_filters(&filter)
            .write_style(config.write_style)
            .format_timestamp_millis()
            .try_init();

        match installed {
            Ok(()) => log::debug!("logging initialized with `{filter}`"),
            Err(_) => log::debug!("host logger already installed; leaving it in place"),
        }
    });
}
