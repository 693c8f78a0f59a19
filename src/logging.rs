//! JSON log output for the binaries.
//!
//! The filter follows the decoder verbosity unless `DSD_STAGE_LOG` holds a directive string,
//! which then wins outright.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_ENV: &str = "DSD_STAGE_LOG";

/// Filter directives for a decoder verbosity level.
///
/// Level 0 keeps only errors. Higher levels open up this crate's own events while other crates
/// stay at `warn`.
pub fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn,dsd_stage=info",
        2 => "warn,dsd_stage=debug",
        _ => "warn,dsd_stage=trace",
    }
}

/// Build the filter from an optional override and the verbosity fallback.
pub fn build_filter(verbosity: u8, env_directives: Option<&str>) -> EnvFilter {
    let directives = env_directives
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| default_directives(verbosity));
    EnvFilter::new(directives)
}

/// Install the JSON subscriber on stderr. Later calls are no-ops.
pub fn init(verbosity: u8) {
    let env_directives = std::env::var(LOG_ENV).ok();
    let filter = build_filter(verbosity, env_directives.as_deref());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_thread_names(true)
                .with_current_span(true),
        )
        .try_init();
}
