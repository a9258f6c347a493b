use tracing::{debug, info, warn};

/// Receives scan/sync notifications. Every method defaults to a no-op so
/// callers only implement what they display.
pub(crate) trait CatalogObserver {
    fn on_progress(&self, _fraction: f64, _message: &str) {}

    fn on_warning(&self, _message: &str) {}

    fn on_catalog_changed(&self, _course_id: i64) {}
}

/// Routes notifications into the log only.
pub(crate) struct TracingObserver;

impl CatalogObserver for TracingObserver {
    fn on_progress(&self, fraction: f64, message: &str) {
        debug!(progress = fraction, "{message}");
    }

    fn on_warning(&self, message: &str) {
        warn!("{message}");
    }

    fn on_catalog_changed(&self, course_id: i64) {
        info!(course_id, "catalog changed");
    }
}

/// Console observer for the CLI: warnings go to stderr next to the log.
pub(crate) struct ConsoleObserver;

impl CatalogObserver for ConsoleObserver {
    fn on_progress(&self, fraction: f64, message: &str) {
        TracingObserver.on_progress(fraction, message);
    }

    fn on_warning(&self, message: &str) {
        debug!("{message}");
        eprintln!("WARN: {message}");
    }

    fn on_catalog_changed(&self, course_id: i64) {
        TracingObserver.on_catalog_changed(course_id);
    }
}
