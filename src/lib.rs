//! Group Trip Decision Engine
//!
//! Turns independently submitted ranked ballots into a single trip decision
//! through instant-runoff rounds, with a restricted runoff on ties.

pub mod config;
pub mod decision;
pub mod errors;
pub mod publish;
pub mod types;

// Re-export commonly used types
pub use errors::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging with the default filter
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripvote=info".into()),
        )
        .try_init()
        .map_err(|e| Error::internal(format!("Logging already initialized: {e}")))?;

    tracing::info!("🧳 Trip decision engine v{} initialized", VERSION);
    Ok(())
}

/// Initialize logging from configuration (`pretty`, `compact` or `json`)
pub fn init_with(logging: &config::LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("tripvote={}", logging.level).into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match logging.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        "pretty" => builder.pretty().try_init(),
        other => {
            return Err(Error::internal(format!("Unknown LOG_FORMAT: {other}")));
        }
    };
    installed.map_err(|e| Error::internal(format!("Logging already initialized: {e}")))?;

    tracing::info!(
        "🧳 Trip decision engine v{} initialized (format={})",
        VERSION,
        logging.format
    );
    Ok(())
}
