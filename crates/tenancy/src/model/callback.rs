//! Completion callbacks.
//!
//! Operations that accept a callback also return their result, so callers
//! can use whichever style suits them. When a callback is supplied it is
//! invoked exactly once, with the value on success or the error on failure,
//! before the result is returned.

use crate::error::{TenancyError, TenancyResult};

/// A completion callback receiving a borrowed result.
pub type Callback<T> = Box<dyn FnOnce(Result<&T, &TenancyError>) + Send>;

/// Boxes a closure as a [`Callback`].
pub fn callback<T, F>(f: F) -> Callback<T>
where
    F: FnOnce(Result<&T, &TenancyError>) + Send + 'static,
{
    Box::new(f)
}

/// Delivers `result` to `callback` (if any) and hands it back.
pub(crate) fn settle<T>(result: TenancyResult<T>, callback: Option<Callback<T>>) -> TenancyResult<T> {
    if let Some(callback) = callback {
        match &result {
            Ok(value) => callback(Ok(value)),
            Err(err) => callback(Err(err)),
        }
    }
    result
}
