//! Printable panic payloads.
//!
//! Handler panics become error replies and connection task panics are
//! logged; both need the payload as text.

use std::{any::Any, fmt};

/// Borrowed panic payload rendered as text.
///
/// `&str` and `String` payloads print verbatim; anything else prints as
/// `<non-string panic>`.
///
/// ```
/// use wiredispatch::panic::describe_panic;
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(describe_panic(payload.as_ref()).to_string(), "boom");
/// ```
#[derive(Clone, Copy)]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl PanicMessage<'_> {
    /// The payload as a string slice, when it is textual.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0
            .downcast_ref::<&'static str>()
            .copied()
            .or_else(|| self.0.downcast_ref::<String>().map(String::as_str))
    }
}

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("<non-string panic>"))
    }
}

impl fmt::Debug for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PanicMessage({self})")
    }
}

/// Wrap a caught panic payload for display.
#[must_use]
pub fn describe_panic(payload: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(payload) }
