//! Error types shared across the proctoring runtime.
//!
//! Browser-boundary failures never travel through these types; they are
//! converted into violations or failure outcomes at the point of the call.

mod types;

pub use types::{ProctorError, Result};
