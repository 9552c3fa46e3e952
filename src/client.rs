//! Requester side of the transfer protocol.
//!
//! Each operation opens its own connection, sends one request line and
//! runs the matching exchange against a local [`FileStore`].

use crate::error::{Result, TransferError};
use crate::framer::{read_line, write_line};
use crate::payload;
use crate::protocol::{
    display_name, parse_file_list, trim_suffix, Request, Status, RESULT_ERR, RESULT_OK,
};
use crate::store::FileStore;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Result of a download request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// File received and saved locally
    Downloaded { bytes: u64 },
    /// Server reported the file missing; nothing was written locally
    NotFoundOnServer,
}

/// Result of an upload request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Payload sent. `acknowledged` records whether the server's trailing
    /// `result: ok` arrived; it is not required for success.
    Uploaded { bytes: u64, acknowledged: bool },
    /// Local source file missing; the server was told not to expect data
    SourceMissing,
}

/// Connects to one server and moves files between it and a local store
#[derive(Debug, Clone)]
pub struct Client {
    server: String,
    store: FileStore,
}

impl Client {
    pub fn new(server: impl Into<String>, store: FileStore) -> Self {
        Client {
            server: server.into(),
            store,
        }
    }

    async fn connect(&self) -> Result<TcpStream> {
        debug!(server = %self.server, "Client connecting");
        let stream = TcpStream::connect(&self.server).await?;
        debug!(server = %self.server, "Client connected");
        Ok(stream)
    }

    pub async fn download(&self, file_name: &[u8]) -> Result<DownloadOutcome> {
        let stream = self.connect().await?;
        download(stream, &self.store, file_name).await
    }

    pub async fn upload(&self, file_name: &[u8]) -> Result<UploadOutcome> {
        let stream = self.connect().await?;
        upload(stream, &self.store, file_name).await
    }

    pub async fn list(&self) -> Result<Vec<Vec<u8>>> {
        let stream = self.connect().await?;
        list(stream).await
    }
}

/// Request `file_name` and save it under the same name in `store`.
pub async fn download<S>(
    stream: S,
    store: &FileStore,
    file_name: &[u8],
) -> Result<DownloadOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    write_line(&mut writer, &Request::download(file_name).to_line()).await?;

    let status_line = read_line(&mut reader).await?;
    match Status::parse(&status_line) {
        Some(Status::Ok) => {}
        Some(Status::Err) => {
            info!(file = ?display_name(file_name), "File not found on server");
            return Ok(DownloadOutcome::NotFoundOnServer);
        }
        None => {
            return Err(TransferError::UnexpectedReply(
                display_name(&status_line).into_owned(),
            ));
        }
    }

    let bytes = payload::stream_to_file(&mut reader, &store.resolve(file_name)).await?;
    info!(file = ?display_name(file_name), bytes, "File saved");
    Ok(DownloadOutcome::Downloaded { bytes })
}

/// Send `file_name` from `store`, announcing first whether it exists.
///
/// After the payload the write side is half-closed so the server sees
/// end of stream. Its acknowledgement is then read if one arrives.
///
/// A source that exists but cannot be opened still gets `result: error`
/// on the wire before the error is returned, so the server is never left
/// waiting for a status line.
pub async fn upload<S>(stream: S, store: &FileStore, file_name: &[u8]) -> Result<UploadOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    write_line(&mut writer, &Request::upload(file_name).to_line()).await?;

    let mut file = match store.open(trim_suffix(file_name)).await {
        Ok(file) => file,
        Err(TransferError::FileNotFound(path)) => {
            info!(path = %path.display(), "Local file does not exist");
            write_line(&mut writer, RESULT_ERR).await?;
            return Ok(UploadOutcome::SourceMissing);
        }
        Err(e) => {
            warn!(file = ?display_name(file_name), error = %e, "Can't open local file");
            write_line(&mut writer, RESULT_ERR).await?;
            return Err(e);
        }
    };

    write_line(&mut writer, RESULT_OK).await?;
    let bytes = payload::send_file(&mut writer, &mut file).await?;
    writer.shutdown().await?;
    info!(file = ?display_name(file_name), bytes, "File sent");

    let acknowledged = match read_line(&mut reader).await {
        Ok(line) if Status::parse(&line) == Some(Status::Ok) => true,
        Ok(line) => {
            warn!(reply = ?display_name(&line), "Unexpected reply after upload");
            false
        }
        Err(TransferError::EndOfStream) => false,
        Err(e) => {
            warn!(error = %e, "Can't read upload acknowledgement");
            false
        }
    };
    debug!(acknowledged, "Upload finished");

    Ok(UploadOutcome::Uploaded {
        bytes,
        acknowledged,
    })
}

/// Fetch the server's file names.
pub async fn list<S>(stream: S) -> Result<Vec<Vec<u8>>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    write_line(&mut writer, &Request::list().to_line()).await?;

    let line = read_line(&mut reader).await?;
    let names = parse_file_list(&line);
    debug!(count = names.len(), "File list received");
    Ok(names)
}
