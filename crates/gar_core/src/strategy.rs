//! Ordered fallbacks for values that can only be recognised by trying them.

use std::fmt::Debug;
use tracing::debug;

use crate::error::{Error, Result};

/// Try each candidate in order and return the first success
///
/// Typical candidates are format versions, obfuscation keys or alternative table offsets. When
/// every attempt fails, [`Error::NoCandidate`] lists each rejection.
///
/// ```
/// use gar_core::strategy::first_success;
///
/// let key = first_success([0x00u8, 0x5A, 0xA5], |key| {
///     match b"\x12\x3F\x36"[0] ^ key {
///         b'H' => Ok(*key),
///         other => Err(gar_core::error::Error::CustomError(format!("decoded {other:#x}"))),
///     }
/// });
/// assert_eq!(key.unwrap(), 0x5A);
/// ```
pub fn first_success<C, T, F>(candidates: impl IntoIterator<Item = C>, mut attempt: F) -> Result<T>
where
    C: Debug,
    F: FnMut(&C) -> Result<T>,
{
    let mut rejected = Vec::new();
    for candidate in candidates {
        match attempt(&candidate) {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(?candidate, %e, "candidate rejected");
                rejected.push(format!("{candidate:?}: {e}"));
            }
        }
    }
    Err(Error::NoCandidate(rejected))
}
