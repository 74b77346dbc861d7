//! # Configuration Module
//!
//! Centralizes the page-geometry constants for shadowkv. The node layout,
//! the split arithmetic, and the on-disk file format all derive from the
//! values in [`constants`]; co-locating them keeps interdependent values
//! from drifting apart, and the compile-time assertion there makes an
//! invalid geometry unbuildable rather than a start-up failure.

pub mod constants;
pub use constants::*;
