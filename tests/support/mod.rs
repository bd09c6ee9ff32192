//! Shared support for end-to-end tests

pub mod client;
pub mod harness;
