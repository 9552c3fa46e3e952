//! Wire grammar for the transfer protocol.
//!
//! Every exchange starts with one request line and carries at most one
//! operation:
//!
//! ```text
//! Request:  <command>:<filename>\n      command is download, upload or list
//! Status:   result: ok\n | result: error\n
//! Listing:  <name1> <name2> ... <nameN>\n
//! Rejected: error: invalid line\n
//! ```
//!
//! Payload bytes follow the status line directly and run until the sender
//! half-closes its side of the connection. There is no length prefix.
//!
//! Lines are handled as raw bytes. File names are not required to be
//! UTF-8 and are passed through unchanged.

use std::borrow::Cow;
use std::fmt;

/// Command word for fetching a file from the server
pub const DOWNLOAD: &str = "download";
/// Command word for sending a file to the server
pub const UPLOAD: &str = "upload";
/// Command word for listing the server's files
pub const LIST: &str = "list";

/// Status line meaning "proceed"
pub const RESULT_OK: &str = "result: ok";
/// Status line meaning "no payload follows"
pub const RESULT_ERR: &str = "result: error";
/// Reply to a request line without a separator
pub const INVALID_LINE: &str = "error: invalid line";

/// Separates the command word from the file name
pub const SEPARATOR: u8 = b':';
/// Line terminator
pub const SUFFIX: u8 = b'\n';
/// Separates names in a listing
pub const LIST_DELIMITER: u8 = b' ';

/// Operation requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Download,
    Upload,
    List,
}

impl Command {
    /// Wire spelling of the command word
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Download => DOWNLOAD,
            Command::Upload => UPLOAD,
            Command::List => LIST,
        }
    }

    /// Match a command word exactly (case-sensitive)
    pub fn from_word(word: &[u8]) -> Option<Self> {
        [Command::Download, Command::Upload, Command::List]
            .into_iter()
            .find(|command| command.as_str().as_bytes() == word)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed request line. The file name is empty for `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub file_name: Vec<u8>,
}

impl Request {
    pub fn new(command: Command, file_name: impl Into<Vec<u8>>) -> Self {
        Request {
            command,
            file_name: file_name.into(),
        }
    }

    pub fn download(file_name: impl Into<Vec<u8>>) -> Self {
        Self::new(Command::Download, file_name)
    }

    pub fn upload(file_name: impl Into<Vec<u8>>) -> Self {
        Self::new(Command::Upload, file_name)
    }

    pub fn list() -> Self {
        Self::new(Command::List, Vec::new())
    }

    /// Request line without its terminator, ready for `write_line`
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = Vec::with_capacity(self.command.as_str().len() + 1 + self.file_name.len());
        line.extend_from_slice(self.command.as_str().as_bytes());
        line.push(SEPARATOR);
        line.extend_from_slice(&self.file_name);
        line
    }
}

/// Request line parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No `:` anywhere in the line
    MissingSeparator,
    /// Separator present, but the command word is not recognized
    UnknownCommand(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingSeparator => write!(f, "Missing ':' separator"),
            ParseError::UnknownCommand(cmd) => write!(f, "Unknown command: {}", cmd),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parser for request lines
pub struct Parser;

impl Parser {
    /// Parse a request line as read off the wire (trailing newline included).
    ///
    /// The line is split on the first `:`. Exactly one trailing `\n` is
    /// removed from the file name; any further newline or `\r` bytes stay
    /// part of the name.
    pub fn parse(line: &[u8]) -> Result<Request, ParseError> {
        let index = line
            .iter()
            .position(|&b| b == SEPARATOR)
            .ok_or(ParseError::MissingSeparator)?;

        let (word, rest) = (&line[..index], &line[index + 1..]);
        let command = Command::from_word(word)
            .ok_or_else(|| ParseError::UnknownCommand(display_name(word).into_owned()))?;

        Ok(Request::new(command, trim_suffix(rest)))
    }
}

/// Remove one trailing newline, if present
pub fn trim_suffix(text: &[u8]) -> &[u8] {
    text.strip_suffix(&[SUFFIX]).unwrap_or(text)
}

/// Readable form of a wire name for logs and messages
pub fn display_name(name: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(name)
}

/// Go/no-go marker exchanged before a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Err,
}

impl Status {
    /// Status line without its terminator
    pub fn as_line(&self) -> &'static str {
        match self {
            Status::Ok => RESULT_OK,
            Status::Err => RESULT_ERR,
        }
    }

    /// Recognize a status line as read off the wire. Anything other than
    /// the two exact markers is `None`.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let line = trim_suffix(line);
        [Status::Ok, Status::Err]
            .into_iter()
            .find(|status| status.as_line().as_bytes() == line)
    }
}

/// Join file names into the single-line listing body
pub fn format_file_list<S: AsRef<[u8]>>(names: &[S]) -> Vec<u8> {
    names
        .iter()
        .map(|name| name.as_ref())
        .collect::<Vec<_>>()
        .join(&LIST_DELIMITER)
}

/// Split a listing line back into names, dropping empty fragments
pub fn parse_file_list(line: &[u8]) -> Vec<Vec<u8>> {
    line.split(|&b| b == LIST_DELIMITER || b == SUFFIX)
        .filter(|name| !name.is_empty())
        .map(<[u8]>::to_vec)
        .collect()
}
