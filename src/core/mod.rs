//! Core infrastructure: configuration, errors, backoff.

pub mod backoff;
pub mod config;
pub mod error;
