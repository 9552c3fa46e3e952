//! ferry: a minimal remote file transfer service
//!
//! A client opens one TCP connection per operation and sends a single
//! request line:
//! - `download:<name>` fetches a file from the server
//! - `upload:<name>` sends a file to the server
//! - `list:` returns the names of the server's files
//!
//! Features:
//! - `result: ok` / `result: error` status line before any payload
//! - Payload end signalled by half-closing the connection
//! - One task per connection, bounded by a connection cap
//! - Configuration via CLI arguments or TOML file

pub mod client;
pub mod config;
pub mod error;
pub mod framer;
pub mod logging;
pub mod payload;
pub mod protocol;
pub mod server;
pub mod store;

pub use client::{Client, DownloadOutcome, UploadOutcome};
pub use config::{ClientConfig, ServerConfig};
pub use error::{Result, TransferError};
pub use protocol::{Command, Request, Status};
pub use server::{Served, Server};
pub use store::FileStore;
