//! Transports that feed platform signals into a `ProctorRuntime`.

pub mod socket;
