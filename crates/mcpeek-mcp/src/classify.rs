//! Retry classification of connection errors.
//!
//! Walks the whole cause chain so that a refused connection wrapped three
//! layers deep still counts as transient, while a cancellation anywhere in
//! the chain always stops retries.

use mcpeek_core::McpeekError;
use std::error::Error;
use std::io;

/// Causes deeper than this are ignored.
const MAX_CHAIN_DEPTH: usize = 32;

/// Retry classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// There was no error.
    None,
    /// Worth retrying: the peer may not be up yet.
    Transient,
    /// Retrying will not help.
    Permanent,
}

/// Classify `err` for retry purposes.
///
/// Priority: cancellation or deadline anywhere in the chain is permanent,
/// then timeouts and refused/reset/unreachable network errors are transient,
/// and everything else is permanent.
pub fn classify(err: Option<&(dyn Error + 'static)>) -> ErrorClass {
    let Some(err) = err else {
        return ErrorClass::None;
    };
    if causes(err).any(is_cancellation) {
        return ErrorClass::Permanent;
    }
    if causes(err).any(is_transient_signal) {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

/// Shorthand for classifying an [`McpeekError`].
pub fn classify_error(err: &McpeekError) -> ErrorClass {
    classify(Some(err))
}

/// Iterate `err` and its causes, outermost first.
///
/// Besides `source()`, custom payloads of `io::Error` are followed via
/// `get_ref()` since `io::Error::source()` skips over them.
pub fn causes<'a>(err: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    let mut next = Some(err);
    let mut depth = 0;
    std::iter::from_fn(move || {
        let current = next?;
        depth += 1;
        next = if depth >= MAX_CHAIN_DEPTH {
            None
        } else {
            match current.downcast_ref::<io::Error>() {
                Some(io_err) => io_err
                    .get_ref()
                    .map(|inner| inner as &(dyn Error + 'static))
                    .or_else(|| current.source()),
                None => current.source(),
            }
        };
        Some(current)
    })
}

fn is_cancellation(err: &(dyn Error + 'static)) -> bool {
    err.downcast_ref::<McpeekError>()
        .is_some_and(McpeekError::is_cancellation)
}

fn is_transient_signal(err: &(dyn Error + 'static)) -> bool {
    if let Some(e) = err.downcast_ref::<McpeekError>() {
        return matches!(e, McpeekError::Timeout(_));
    }
    if let Some(e) = err.downcast_ref::<io::Error>() {
        return matches!(
            e.kind(),
            io::ErrorKind::TimedOut
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::NetworkUnreachable
                | io::ErrorKind::HostUnreachable
        );
    }
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        return e.is_timeout();
    }
    err.is::<tokio::time::error::Elapsed>()
}
