//! Convenience for embedder callbacks that want to fail with a plain message
//! instead of defining a dedicated error type.

use std::fmt;

use jana_core::arrow::CallbackError;

#[derive(Debug)]
pub struct Failure(pub String);

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Failure {}

/// Boxes a plain message as a `CallbackError`, the type every `Source`,
/// `Processor`, `Factory`, `Unfolder`, and `Fold` callback returns on error.
pub fn fail(message: impl Into<String>) -> CallbackError {
    Box::new(Failure(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_carries_the_message_through_display() {
        let err = fail("bad calibration constant");
        assert_eq!(err.to_string(), "bad calibration constant");
    }
}
