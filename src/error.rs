//! Error types shared by the server and client roles.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Failures that can end a single transfer.
///
/// None of these escape a connection handler: the server logs them and
/// closes the connection, the client reports them to the user.
#[derive(Debug)]
pub enum TransferError {
    /// Requested file is absent (download) or the local source is absent (upload)
    FileNotFound(PathBuf),
    /// Request line had no `:` separator or named an unknown command
    MalformedRequest(String),
    /// Peer answered with a line that is not a recognized status marker
    UnexpectedReply(String),
    /// Peer closed the stream before sending a single byte of a line
    EndOfStream,
    /// Local disk or network failure
    Io(io::Error),
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferError::FileNotFound(path) => {
                write!(f, "File not found: {}", path.display())
            }
            TransferError::MalformedRequest(line) => {
                write!(f, "Malformed request line: {:?}", line)
            }
            TransferError::UnexpectedReply(line) => {
                write!(f, "Unexpected reply: {:?}", line)
            }
            TransferError::EndOfStream => write!(f, "Unexpected end of stream"),
            TransferError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        TransferError::Io(e)
    }
}
