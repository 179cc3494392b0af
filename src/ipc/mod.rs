//! IPC module for communication between clients and the jobapps service.
//!
//! The service runs a TCP server speaking length-prefixed JSON; clients
//! connect once per request.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use protocol::*;
pub use server::IpcServer;
