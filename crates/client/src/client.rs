use std::future::Future;
use std::path::PathBuf;

use fileport_protocol::{
    Command, Digest, FileName, GetResponse, ProtocolError, Status, read_get_response, read_status,
    write_command,
};
use fileport_transfer::{TransferEngine, TransferOutcome};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info};

use crate::TCP_BUFFER_SIZE;
use crate::config::ClientConfig;
use crate::error::ClientError;

type Reader = BufReader<OwnedReadHalf>;
type Writer = BufWriter<OwnedWriteHalf>;

/// Talks to one fileport server.
#[derive(Debug, Clone)]
pub struct FileClient {
    config: ClientConfig,
    engine: TransferEngine,
}

impl FileClient {
    pub fn new(config: ClientConfig) -> Self {
        let engine = TransferEngine::new(config.chunk_size).with_stall_timeout(config.io_timeout);
        Self { config, engine }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Downloads `name` into the local directory.
    ///
    /// The local copy is replaced only once the whole payload arrived.
    pub async fn request(&self, name: &str) -> Result<TransferOutcome, ClientError> {
        let name = parse_name(name)?;
        let path = self.local_path(&name);

        let (mut reader, mut writer) = self.connect().await?;
        self.timed("sending command", write_command(&mut writer, &Command::Get(name.clone())))
            .await?;

        match self.timed("waiting for the reply", read_get_response(&mut reader)).await? {
            GetResponse::Data(len) => {
                debug!(name = %name, bytes = len, "receiving file");
                let outcome = self.engine.receive_file(&mut reader, &path, len).await?;
                info!(
                    name = %name,
                    bytes = outcome.bytes,
                    digest = %outcome.digest,
                    "file downloaded to {}",
                    path.display()
                );
                Ok(outcome)
            }
            GetResponse::Error(message) => Err(ClientError::Rejected(message)),
        }
    }

    /// Replaces the server's copy of `name` with the local file.
    pub async fn update(&self, name: &str) -> Result<Digest, ClientError> {
        let name = parse_name(name)?;
        self.upload(Command::Put(name)).await
    }

    /// Stores the local file `name` on the server, which must not have it yet.
    pub async fn create(&self, name: &str) -> Result<Digest, ClientError> {
        let name = parse_name(name)?;
        self.upload(Command::New(name)).await
    }

    async fn upload(&self, command: Command) -> Result<Digest, ClientError> {
        let name = command.name().clone();
        let path = self.local_path(&name);

        // Checked before connecting so a missing file costs no round trip.
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => {}
            Ok(_) => return Err(ClientError::LocalFileNotFound(path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ClientError::LocalFileNotFound(path));
            }
            Err(e) => return Err(e.into()),
        }

        let (mut reader, mut writer) = self.connect().await?;
        self.timed("sending command", write_command(&mut writer, &command)).await?;

        match self.timed("waiting for the go-ahead", read_status(&mut reader)).await? {
            Status::Ready => {}
            Status::Error(message) => return Err(ClientError::Rejected(message)),
            other => {
                return Err(ProtocolError::MalformedStatus(format!(
                    "expected go-ahead, got {}",
                    other.encode().trim_end()
                ))
                .into());
            }
        }

        let sent = match self.engine.send_file(&mut writer, &path).await {
            Ok(outcome) => outcome,
            // Vanished between the check and the open.
            Err(fileport_transfer::TransferError::FileNotFound(p)) => {
                return Err(ClientError::LocalFileNotFound(p));
            }
            Err(e) => return Err(e.into()),
        };

        let remote = match self.timed("waiting for confirmation", read_status(&mut reader)).await? {
            Status::Stored(digest) => digest,
            Status::Error(message) => return Err(ClientError::Rejected(message)),
            Status::Ready => {
                return Err(ProtocolError::MalformedStatus("unexpected go-ahead".into()).into());
            }
        };

        if remote != sent.digest {
            return Err(ClientError::DigestMismatch {
                local: sent.digest,
                remote,
            });
        }

        // Best effort: the exchange is complete either way.
        let _ = writer.shutdown().await;

        info!(
            command = command.verb(),
            name = %name,
            bytes = sent.bytes,
            digest = %remote,
            "file stored on server"
        );
        Ok(remote)
    }

    fn local_path(&self, name: &FileName) -> PathBuf {
        self.config.local_dir.join(name.as_str())
    }

    async fn connect(&self) -> Result<(Reader, Writer), ClientError> {
        let addr = self.config.addr;
        let stream =
            match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(s)) => s,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(ClientError::Timeout("connecting")),
            };
        debug!(%addr, "connected");

        if let Err(e) = stream.set_nodelay(true) {
            debug!(%addr, "set_nodelay failed: {e}");
        }

        let (reader, writer) = stream.into_split();
        Ok((
            BufReader::with_capacity(TCP_BUFFER_SIZE, reader),
            BufWriter::with_capacity(TCP_BUFFER_SIZE, writer),
        ))
    }

    async fn timed<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = Result<T, ProtocolError>>,
    ) -> Result<T, ClientError> {
        match self.config.io_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(ClientError::Timeout(what)),
            },
            None => Ok(fut.await?),
        }
    }
}

fn parse_name(name: &str) -> Result<FileName, ClientError> {
    FileName::new(name).map_err(ClientError::InvalidName)
}
