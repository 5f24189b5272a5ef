//! Per-connection command loop.
//!
//! ```text
//! AwaitCommand -> Dispatch -> Sending   (GET)     -> AwaitCommand
//!                          -> Receiving (PUT/NEW) -> AwaitCommand
//! any state    -> Closed   (peer EOF, idle timeout, shutdown, transport error)
//! ```
//!
//! Errors that concern a single command (bad verb, unsafe name, missing or
//! already existing target) are answered with an `ERROR:` frame and the loop
//! continues. Errors that leave the stream in an unknown position close it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fileport_protocol::{
    Command, FileName, ProtocolError, Status, decode_command, read_command_line, write_status,
};
use fileport_transfer::{TransferEngine, TransferError};
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::{MSG_ALREADY_EXISTS, MSG_NOT_FOUND, MSG_TOO_LARGE, ServerError};

/// Read/write buffer size for a client connection.
const CONN_BUFFER_SIZE: usize = 64 * 1024;

/// Counters for one client session, logged when it closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub commands: u64,
    pub files_sent: u64,
    pub files_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub errors_reported: u64,
}

/// What the loop does after a command.
enum Flow {
    Continue,
    Close,
}

/// Owns one client connection for its whole lifetime.
pub struct ConnectionHandler {
    peer: SocketAddr,
    root: PathBuf,
    engine: TransferEngine,
    idle_timeout: Option<Duration>,
    max_upload_bytes: Option<u64>,
    cancel: CancellationToken,
    stats: SessionStats,
}

impl ConnectionHandler {
    pub fn new(peer: SocketAddr, config: &ServerConfig, cancel: CancellationToken) -> Self {
        Self {
            peer,
            root: config.storage_root.clone(),
            engine: TransferEngine::new(config.chunk_size)
                .with_stall_timeout(config.stall_timeout),
            idle_timeout: config.idle_timeout,
            max_upload_bytes: config.max_upload_bytes,
            cancel,
            stats: SessionStats::default(),
        }
    }

    /// Runs the command loop until the connection closes.
    ///
    /// Returns the session counters on an orderly close (peer EOF, idle
    /// timeout, shutdown) and the error on a transport failure.
    pub async fn run<R, W>(mut self, reader: R, writer: W) -> Result<SessionStats, ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::with_capacity(CONN_BUFFER_SIZE, reader);
        let mut writer = BufWriter::with_capacity(CONN_BUFFER_SIZE, writer);

        let result = self.command_loop(&mut reader, &mut writer).await;

        info!(
            peer = %self.peer,
            commands = self.stats.commands,
            sent = self.stats.bytes_sent,
            received = self.stats.bytes_received,
            errors = self.stats.errors_reported,
            "client disconnected"
        );

        result.map(|()| self.stats)
    }

    async fn command_loop<R, W>(
        &mut self,
        reader: &mut BufReader<R>,
        writer: &mut BufWriter<W>,
    ) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            // AwaitCommand
            let line = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(peer = %self.peer, "server shutting down, closing connection");
                    return Ok(());
                }
                result = self.await_command(reader) => result,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(()),
                Err(e) if e.is_recoverable() => {
                    self.reply_error(writer, e.to_string()).await?;
                    continue;
                }
                Err(e @ ProtocolError::LineTooLong(_)) => {
                    warn!(peer = %self.peer, "{e}, closing connection");
                    self.reply_error(writer, e.to_string()).await?;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            // Dispatch
            self.stats.commands += 1;
            let command = match decode_command(&line) {
                Ok(command) => command,
                Err(e) => {
                    warn!(peer = %self.peer, line = %line.escape_debug(), "rejected command: {e}");
                    self.reply_error(writer, e.to_string()).await?;
                    continue;
                }
            };
            debug!(peer = %self.peer, %command, "command received");

            let flow = match &command {
                Command::Get(name) => self.handle_get(writer, name).await?,
                Command::Put(name) | Command::New(name) => {
                    let target = self.root.join(name.as_str());
                    self.handle_upload(reader, writer, &command, &target).await?
                }
            };

            if let Flow::Close = flow {
                return Ok(());
            }
        }
    }

    /// Reads the next command line, honouring the idle timeout.
    async fn await_command<R: AsyncRead + Unpin>(
        &self,
        reader: &mut BufReader<R>,
    ) -> Result<Option<String>, ProtocolError> {
        let Some(limit) = self.idle_timeout else {
            return read_command_line(reader).await;
        };

        match tokio::time::timeout(limit, read_command_line(reader)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(peer = %self.peer, ?limit, "idle timeout, closing connection");
                Ok(None)
            }
        }
    }

    /// Sending state.
    async fn handle_get<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut BufWriter<W>,
        name: &FileName,
    ) -> Result<Flow, ServerError> {
        let path = self.root.join(name.as_str());

        match self.engine.send_file(writer, &path).await {
            Ok(outcome) => {
                self.stats.files_sent += 1;
                self.stats.bytes_sent += outcome.bytes;
                info!(
                    peer = %self.peer,
                    %name,
                    bytes = outcome.bytes,
                    digest = %outcome.digest,
                    "file sent"
                );
                Ok(Flow::Continue)
            }
            Err(TransferError::FileNotFound(_)) => {
                debug!(peer = %self.peer, %name, "GET of missing file");
                self.reply_error(writer, MSG_NOT_FOUND).await?;
                Ok(Flow::Continue)
            }
            Err(TransferError::Storage(e)) => {
                warn!(peer = %self.peer, %name, "cannot open file: {e}");
                self.reply_error(writer, format!("io error: {e}")).await?;
                Ok(Flow::Continue)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Receiving state.
    ///
    /// The precondition is checked before the client is told to send, so a
    /// rejected upload never leaves unread payload on the stream.
    async fn handle_upload<R, W>(
        &mut self,
        reader: &mut BufReader<R>,
        writer: &mut BufWriter<W>,
        command: &Command,
        target: &Path,
    ) -> Result<Flow, ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let name = command.name();

        let exists = match tokio::fs::metadata(target).await {
            Ok(meta) => Some(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(peer = %self.peer, %name, "cannot stat target: {e}");
                self.reply_error(writer, format!("io error: {e}")).await?;
                return Ok(Flow::Continue);
            }
        };

        let refusal = match (command, exists) {
            (Command::Put(_), None | Some(false)) => Some(MSG_NOT_FOUND),
            (Command::New(_), Some(_)) => Some(MSG_ALREADY_EXISTS),
            _ => None,
        };
        if let Some(message) = refusal {
            debug!(peer = %self.peer, %command, "upload refused: {message}");
            self.reply_error(writer, message).await?;
            return Ok(Flow::Continue);
        }

        write_status(writer, &Status::Ready).await?;

        let len = match self.engine.read_header(reader).await {
            Ok(len) => len,
            Err(TransferError::Protocol(
                e @ (ProtocolError::MalformedLength(_) | ProtocolError::ValueOutOfRange(_)),
            )) => {
                warn!(peer = %self.peer, %name, "{e}, closing connection");
                let _ = self.reply_error(writer, e.to_string()).await;
                return Ok(Flow::Close);
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(max) = self.max_upload_bytes {
            if len > max {
                warn!(peer = %self.peer, %name, len, max, "upload too large, closing connection");
                self.reply_error(writer, MSG_TOO_LARGE).await?;
                return Ok(Flow::Close);
            }
        }

        match self.engine.receive_file(reader, target, len).await {
            Ok(outcome) => {
                self.stats.files_received += 1;
                self.stats.bytes_received += outcome.bytes;
                info!(
                    peer = %self.peer,
                    %command,
                    bytes = outcome.bytes,
                    digest = %outcome.digest,
                    "file stored"
                );
                write_status(writer, &Status::Stored(outcome.digest)).await?;
                Ok(Flow::Continue)
            }
            Err(TransferError::Storage(e)) => {
                // Unread payload may remain, so the connection cannot be reused.
                warn!(peer = %self.peer, %name, "storing upload failed: {e}");
                let _ = self.reply_error(writer, format!("io error: {e}")).await;
                Ok(Flow::Close)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reply_error<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut BufWriter<W>,
        message: impl Into<String>,
    ) -> Result<(), ServerError> {
        self.stats.errors_reported += 1;
        write_status(writer, &Status::error(message)).await?;
        Ok(())
    }
}
