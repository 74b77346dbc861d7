//! # Error Kinds
//!
//! shadowkv reports failures through [`eyre::Report`] like the rest of the
//! codebase, but the four kinds a caller may want to branch on are carried
//! as a typed [`ErrorKind`] inside the report so they survive context
//! wrapping and can be recovered with `report.downcast_ref::<ErrorKind>()`.
//!
//! Absence is not an error: `get` returns `Option` and `delete` returns
//! `bool`. I/O failures surface as wrapped `std::io::Error` values.

use thiserror::Error;

use crate::config::{MAX_KEY_SIZE, MAX_VALUE_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("key length {len} exceeds maximum {}", MAX_KEY_SIZE)]
    KeyTooLarge { len: usize },

    #[error("value length {len} exceeds maximum {}", MAX_VALUE_SIZE)]
    ValueTooLarge { len: usize },

    #[error("page store capacity exhausted")]
    OutOfSpace,

    #[error("corrupt page: {reason}")]
    CorruptPage { reason: String },
}
