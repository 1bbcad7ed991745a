//! Logging setup and the boundary middleware.
//!
//! Components do not log on their own. Calls that cross a component boundary
//! (running a process, building an archive, uploading a file, operating a
//! service, executing a pipeline action) are wrapped in [`traced`], which
//! opens a span and logs the start and the outcome uniformly.

use std::fmt::Display;
use std::time::Instant;

use tracing::{debug, info, info_span, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::constants::PKG_NAME;

/// A unit of work whose success can be inspected after the fact.
pub trait Outcome {
    /// Whether the unit of work succeeded.
    fn succeeded(&self) -> bool;
}

/// Runs `f` inside a span named after `component`, logging start and outcome.
pub fn traced<T, F>(component: &'static str, operation: &str, subject: &dyn Display, f: F) -> T
where
    T: Outcome,
    F: FnOnce() -> T,
{
    let span = info_span!("op", component, operation, subject = %subject);
    let _entered = span.enter();
    debug!("started");
    let clock = Instant::now();
    let outcome = f();
    let elapsed_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    if outcome.succeeded() {
        info!(elapsed_ms, "completed");
    } else {
        warn!(elapsed_ms, "failed");
    }
    outcome
}

/// Installs the global subscriber. `RUST_LOG` wins over `verbosity`.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let crate_target = PKG_NAME.replace('-', "_");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{crate_target}={level},warn").into());
    // A second call (as in tests) leaves the first subscriber in place.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
