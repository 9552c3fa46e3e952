//! TCP server for file transfer connections.
//!
//! Accepts connections and hands each one to its own task. A connection
//! carries exactly one request; the task reads it, runs the matching
//! exchange and closes the connection.

use crate::config::ServerConfig;
use crate::error::{Result, TransferError};
use crate::framer::{read_line, write_line};
use crate::payload;
use crate::protocol::{
    display_name, format_file_list, Command, ParseError, Parser, Status, INVALID_LINE, RESULT_ERR,
    RESULT_OK,
};
use crate::store::FileStore;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Pending connections the kernel may queue
const LISTEN_BACKLOG: i32 = 1024;

/// What a connection ended up doing.
///
/// File names are in readable form; bytes that are not UTF-8 show as
/// replacement characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    /// Upload persisted and acknowledged
    Uploaded { file_name: String, bytes: u64 },
    /// Uploader reported its source missing; nothing was written
    UploadDeclined { file_name: String },
    /// File sent in full
    Downloaded { file_name: String, bytes: u64 },
    /// Requested file could not be opened; error status sent
    NotFound { file_name: String },
    /// Listing line sent
    Listed { count: usize },
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    store: Arc<FileStore>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Bind the listening socket and prepare the store directory.
    ///
    /// Failure here is the only error that stops the whole server.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let store = FileStore::new(&config.root);
        store.ensure_root().await?;

        let addr = tokio::net::lookup_host(&config.listen)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no address resolved for {}", config.listen),
                )
            })?;

        let listener = TcpListener::from_std(create_listener(addr)?)?;
        info!(address = %listener.local_addr()?, "Server listening");

        Ok(Server {
            listener,
            store: Arc::new(store),
            connection_limit: Arc::new(Semaphore::new(config.max_connections.max(1))),
        })
    }

    /// Address the server is actually bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until Ctrl-C
    pub async fn run(self) -> io::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// Connections already handed to a task keep running after this
    /// returns.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            // Wait for a connection slot
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.connection_limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Connection accepted");

                    let store = Arc::clone(&self.store);
                    tokio::spawn(async move {
                        handle_connection(stream, peer, &store).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }

        info!("Server stopped accepting connections");
        Ok(())
    }
}

/// Create the listening socket with address reuse enabled
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// Run one connection to completion and log how it ended.
///
/// The stream is dropped, and so closed, on every path out of here.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, store: &FileStore) {
    match serve_connection(stream, store).await {
        Ok(served) => info!(peer = %peer, ?served, "Connection served"),
        Err(TransferError::EndOfStream) => {
            debug!(peer = %peer, "Peer closed before sending a request")
        }
        Err(e) => warn!(peer = %peer, error = %e, "Connection aborted"),
    }
    debug!(peer = %peer, "Connection closed");
}

/// Read one request from `stream` and run the matching exchange.
///
/// Malformed requests get their reply line before the error is returned.
pub async fn serve_connection<S>(stream: S, store: &FileStore) -> Result<Served>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    let line = read_line(&mut reader).await?;

    let request = match Parser::parse(&line) {
        Ok(request) => request,
        Err(ParseError::MissingSeparator) => {
            let line = display_name(&line).into_owned();
            warn!(line = ?line, "Invalid line received");
            write_line(&mut writer, INVALID_LINE).await?;
            return Err(TransferError::MalformedRequest(line));
        }
        Err(ParseError::UnknownCommand(word)) => {
            warn!(command = %word, "Invalid operation selected");
            write_line(&mut writer, RESULT_ERR).await?;
            return Err(TransferError::MalformedRequest(
                display_name(&line).into_owned(),
            ));
        }
    };

    let file_name = request.file_name.as_slice();
    debug!(command = %request.command, file = ?display_name(file_name), "Request received");

    match request.command {
        Command::Upload => receive_upload(&mut reader, &mut writer, store, file_name).await,
        Command::Download => send_download(&mut writer, store, file_name).await,
        Command::List => send_list(&mut writer, store).await,
    }
}

/// Upload: status marker from the client, then payload until EOF
async fn receive_upload<R, W>(
    reader: &mut R,
    writer: &mut W,
    store: &FileStore,
    file_name: &[u8],
) -> Result<Served>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let name = display_name(file_name).into_owned();

    let status_line = read_line(reader).await?;
    match Status::parse(&status_line) {
        Some(Status::Ok) => {}
        Some(Status::Err) => {
            info!(file = ?name, "Uploader has no such file, nothing written");
            return Ok(Served::UploadDeclined { file_name: name });
        }
        None => {
            return Err(TransferError::UnexpectedReply(
                display_name(&status_line).into_owned(),
            ));
        }
    }

    if store.exists(file_name).await {
        debug!(file = ?name, "Overwriting existing file");
    }

    let bytes = payload::stream_to_file(reader, &store.resolve(file_name)).await?;
    info!(file = ?name, bytes, "File written");

    write_line(writer, RESULT_OK).await?;
    Ok(Served::Uploaded {
        file_name: name,
        bytes,
    })
}

/// Download: status marker, then the file, then half-close
async fn send_download<W>(writer: &mut W, store: &FileStore, file_name: &[u8]) -> Result<Served>
where
    W: AsyncWrite + Unpin,
{
    let name = display_name(file_name).into_owned();

    let mut file = match store.open(file_name).await {
        Ok(file) => file,
        Err(e) => {
            info!(file = ?name, error = %e, "Can't open requested file");
            write_line(writer, RESULT_ERR).await?;
            return Ok(Served::NotFound { file_name: name });
        }
    };

    write_line(writer, RESULT_OK).await?;
    let bytes = payload::send_file(writer, &mut file).await?;
    writer.shutdown().await?;

    info!(file = ?name, bytes, "File sent");
    Ok(Served::Downloaded {
        file_name: name,
        bytes,
    })
}

/// List: one space-joined line, no status marker
async fn send_list<W>(writer: &mut W, store: &FileStore) -> Result<Served>
where
    W: AsyncWrite + Unpin,
{
    let names = store.list_names().await.unwrap_or_else(|e| {
        warn!(root = %store.root().display(), error = %e, "Can't read store directory");
        Vec::new()
    });

    write_line(writer, &format_file_list(&names)).await?;
    Ok(Served::Listed { count: names.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    fn store_with_files() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"").unwrap();
        let store = FileStore::new(dir.path());
        (dir, store)
    }

    /// Send `input`, half-close, and collect everything the server writes
    async fn exchange(store: &FileStore, input: &[u8]) -> (Result<Served>, Vec<u8>) {
        let (mut client, server) = duplex(64 * 1024);
        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();

        let result = serve_connection(server, store).await;

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        (result, output)
    }

    #[tokio::test]
    async fn test_list() {
        let (_dir, store) = store_with_files();
        let (result, output) = exchange(&store, b"list:\n").await;

        assert_eq!(result.unwrap(), Served::Listed { count: 2 });
        assert_eq!(output, b"a.txt b.txt\n");
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let (result, output) = exchange(&store, b"list:\n").await;

        assert_eq!(result.unwrap(), Served::Listed { count: 0 });
        assert_eq!(output, b"\n");
    }

    #[tokio::test]
    async fn test_download_existing() {
        let (_dir, store) = store_with_files();
        let (result, output) = exchange(&store, b"download:a.txt\n").await;

        assert_eq!(
            result.unwrap(),
            Served::Downloaded {
                file_name: "a.txt".to_string(),
                bytes: 2
            }
        );
        assert_eq!(output, b"result: ok\nhi");
    }

    #[tokio::test]
    async fn test_download_empty_file() {
        let (_dir, store) = store_with_files();
        let (_, output) = exchange(&store, b"download:b.txt\n").await;
        assert_eq!(output, b"result: ok\n");
    }

    #[tokio::test]
    async fn test_download_missing() {
        let (_dir, store) = store_with_files();
        let (result, output) = exchange(&store, b"download:c.txt\n").await;

        assert_eq!(
            result.unwrap(),
            Served::NotFound {
                file_name: "c.txt".to_string()
            }
        );
        assert_eq!(output, b"result: error\n");
    }

    #[tokio::test]
    async fn test_download_non_utf8_name() {
        let (_dir, store) = store_with_files();
        let (result, output) = exchange(&store, b"download:\xffc.txt\n").await;

        assert_eq!(
            result.unwrap(),
            Served::NotFound {
                file_name: "\u{fffd}c.txt".to_string()
            }
        );
        assert_eq!(output, b"result: error\n");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_non_utf8_name_round_trip() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (dir, store) = store_with_files();
        let (result, output) = exchange(&store, b"upload:\xff.bin\nresult: ok\ndata").await;
        assert!(matches!(result, Ok(Served::Uploaded { bytes: 4, .. })));
        assert_eq!(output, b"result: ok\n");
        assert_eq!(
            std::fs::read(dir.path().join(OsStr::from_bytes(b"\xff.bin"))).unwrap(),
            b"data"
        );

        let (_, output) = exchange(&store, b"download:\xff.bin\n").await;
        assert_eq!(output, b"result: ok\ndata");

        let (_, output) = exchange(&store, b"list:\n").await;
        assert_eq!(output, b"a.txt b.txt \xff.bin\n");
    }

    #[tokio::test]
    async fn test_upload_writes_file_and_acknowledges() {
        let (dir, store) = store_with_files();
        let input = b"upload:new.bin\nresult: ok\n\x00\x01payload";
        let (result, output) = exchange(&store, input).await;

        assert_eq!(
            result.unwrap(),
            Served::Uploaded {
                file_name: "new.bin".to_string(),
                bytes: 9
            }
        );
        assert_eq!(output, b"result: ok\n");
        assert_eq!(
            std::fs::read(dir.path().join("new.bin")).unwrap(),
            b"\x00\x01payload"
        );
    }

    #[tokio::test]
    async fn test_upload_declined_leaves_target() {
        let (dir, store) = store_with_files();
        let (result, output) = exchange(&store, b"upload:a.txt\nresult: error\n").await;

        assert_eq!(
            result.unwrap(),
            Served::UploadDeclined {
                file_name: "a.txt".to_string()
            }
        );
        assert!(output.is_empty());
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_upload_without_status_line() {
        let (dir, store) = store_with_files();
        let (result, output) = exchange(&store, b"upload:a.txt\nraw bytes\n").await;

        assert!(matches!(result, Err(TransferError::UnexpectedReply(_))));
        assert!(output.is_empty());
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_malformed_line() {
        let (_dir, store) = store_with_files();
        let (result, output) = exchange(&store, b"list\n").await;

        assert!(matches!(result, Err(TransferError::MalformedRequest(_))));
        assert_eq!(output, b"error: invalid line\n");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (_dir, store) = store_with_files();
        let (result, output) = exchange(&store, b"delete:a.txt\n").await;

        assert!(matches!(result, Err(TransferError::MalformedRequest(_))));
        assert_eq!(output, b"result: error\n");
    }

    #[tokio::test]
    async fn test_no_request() {
        let (_dir, store) = store_with_files();
        let (result, output) = exchange(&store, b"").await;

        assert!(matches!(result, Err(TransferError::EndOfStream)));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_bind_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            listen: "127.0.0.1:0".to_string(),
            root: dir.path().join("files"),
            max_connections: 4,
            log_level: "info".to_string(),
            log_file: dir.path().join("server-log.txt"),
        };

        let server = Server::bind(config).await.unwrap();
        assert!(dir.path().join("files").is_dir());
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }
}
