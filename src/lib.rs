//! An SMTP sink: accepts mail from authenticated (or trusted) clients and
//! keeps every message in a [`store::MessageStore`] for later inspection.

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod message;
pub mod smtp;
pub mod store;

pub use controller::{Blackhole, Signal};
pub use tracing;
