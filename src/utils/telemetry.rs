//! Tracing setup for binaries and tests that want the optimizer's
//! structured events on stderr without wiring a subscriber themselves.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Directive applied when `RUST_LOG` is unset or unparsable.
const FALLBACK_DIRECTIVE: &str = "gepa_rs=info";

static INSTALLED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("a global tracing subscriber is already installed")]
    SubscriberConflict(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs a process-global compact subscriber for this crate's events.
///
/// `RUST_LOG` takes precedence; without it (or with an unparsable value)
/// logging falls back to `gepa_rs=info`. Calling this again after a
/// successful install is a no-op, so library consumers and test binaries can
/// both call it unconditionally.
pub fn init_tracing() -> Result<(), TelemetryInitError> {
    if INSTALLED.load(Ordering::Acquire) {
        return Ok(());
    }

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter())
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    INSTALLED.store(true, Ordering::Release);
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(FALLBACK_DIRECTIVE))
        .unwrap_or_default()
}

/// Caps `text` at `max_chars` characters for embedding in log events,
/// marking any cut with an ellipsis. Short inputs are borrowed untouched;
/// the cut always lands on a character boundary.
pub fn truncate(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}…", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_borrows_short_input() {
        assert!(matches!(truncate("short", 10), Cow::Borrowed("short")));
        assert!(matches!(truncate("exact", 5), Cow::Borrowed("exact")));
    }

    #[test]
    fn truncate_cuts_on_char_boundaries() {
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("äöüß", 2), "äö…");
    }
}
