//! Error types for container operations.
//!
//! Most invariant rejections in the engine are silent: a refused write or
//! delete returns `false`, mirroring the non-strict failure mode of the
//! object model the engine tracks. The errors here cover the remaining
//! cases where an operation needs to produce a value and the target is of
//! the wrong kind entirely (calling a non-function, splicing a map, ...).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The value is not a function and cannot be invoked.
    #[error("{0} value is not callable")]
    NotCallable(&'static str),

    /// A container method was invoked on the wrong kind of target.
    #[error("{op} expects {expected} target, found {found}")]
    KindMismatch {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_operation() {
        let err = Error::KindMismatch {
            op: "push",
            expected: "array",
            found: "map",
        };
        assert_eq!(err.to_string(), "push expects array target, found map");

        let err = Error::NotCallable("object");
        assert_eq!(err.to_string(), "object value is not callable");
    }
}
