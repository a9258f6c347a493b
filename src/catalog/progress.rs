use super::CatalogError;
use super::model::{WatchState, WatchStatus};

/// Resolves a requested status change into a valid watch state.
///
/// For `PartiallyWatched` the raw `watched_input` must parse as a number
/// (a decimal comma is accepted). Out-of-range values are coerced: at or past
/// the end becomes `Watched`, zero or below becomes `Unwatched`.
pub(crate) fn resolve_watch_state(
    duration_seconds: f64,
    target: WatchStatus,
    watched_input: Option<&str>,
) -> Result<WatchState, CatalogError> {
    match target {
        WatchStatus::Watched => Ok(WatchState::Watched),
        WatchStatus::Unwatched => Ok(WatchState::Unwatched),
        WatchStatus::PartiallyWatched => {
            let raw = watched_input.unwrap_or("").trim();
            let seconds = parse_seconds(raw).ok_or_else(|| {
                CatalogError::InvalidInput(format!(
                    "invalid value for watched time: '{raw}'. Must be a number of seconds."
                ))
            })?;

            if seconds > 0.0 && seconds < duration_seconds {
                Ok(WatchState::Partial(seconds))
            } else if seconds >= duration_seconds {
                Ok(WatchState::Watched)
            } else {
                Ok(WatchState::Unwatched)
            }
        }
    }
}

pub(crate) fn parse_seconds(raw: &str) -> Option<f64> {
    let value = raw.trim().replace(',', ".").parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}
