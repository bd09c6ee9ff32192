//! The SMTP receiving side: wire parsing, per-connection sessions and the
//! accept loop that spawns them.

pub mod auth;
pub mod command;
pub mod connection;
pub mod envelope;
pub mod extensions;
pub mod listener;
pub mod session;
pub mod status;

pub use listener::Listener;
