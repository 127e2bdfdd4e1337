//! Line-oriented I/O for the server side of the stdio protocol.
//!
//! A [`LineIo`] splits into an independent reader and writer so the server
//! can keep reading requests while responses are being written.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::mpsc;

use crate::error::McpError;

#[async_trait]
pub trait LineReader: Send {
    /// Next non-empty line, trimmed. `None` once the peer has closed.
    async fn read_line(&mut self) -> Result<Option<String>, McpError>;
}

#[async_trait]
pub trait LineWriter: Send {
    /// Write one message followed by a newline.
    async fn write_line(&mut self, line: &str) -> Result<(), McpError>;
}

pub trait LineIo: Send {
    type Reader: LineReader + 'static;
    type Writer: LineWriter + 'static;

    fn split(self) -> (Self::Reader, Self::Writer);
}

// ── Byte streams (stdio, pipes, duplex) ─────────────────────────────

/// Newline-delimited JSON over any async byte streams.
pub struct StreamLines<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> StreamLines<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl StreamLines<tokio::io::Stdin, tokio::io::Stdout> {
    /// Read from stdin, write to stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

pub struct StreamReader<R> {
    lines: Lines<BufReader<R>>,
}

pub struct StreamWriter<W> {
    writer: W,
}

impl<R, W> LineIo for StreamLines<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Reader = StreamReader<R>;
    type Writer = StreamWriter<W>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (
            StreamReader {
                lines: BufReader::new(self.reader).lines(),
            },
            StreamWriter {
                writer: self.writer,
            },
        )
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> LineReader for StreamReader<R> {
    async fn read_line(&mut self) -> Result<Option<String>, McpError> {
        while let Some(line) = self.lines.next_line().await? {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> LineWriter for StreamWriter<W> {
    async fn write_line(&mut self, line: &str) -> Result<(), McpError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

// ── In-memory channels ──────────────────────────────────────────────

/// In-memory line transport for testing, backed by channel pairs.
pub struct ChannelLines {
    rx: mpsc::Receiver<String>,
    tx: mpsc::Sender<String>,
}

impl ChannelLines {
    /// Create a pair of connected endpoints.
    ///
    /// Lines written on one endpoint are read by the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = mpsc::channel(32);
        let (tx_b, rx_a) = mpsc::channel(32);
        (Self { rx: rx_a, tx: tx_a }, Self { rx: rx_b, tx: tx_b })
    }

    pub async fn send(&self, line: impl Into<String>) -> Result<(), McpError> {
        self.tx
            .send(line.into())
            .await
            .map_err(|_| McpError::Transport("channel closed".to_string()))
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

pub struct ChannelReader(mpsc::Receiver<String>);

pub struct ChannelWriter(mpsc::Sender<String>);

impl LineIo for ChannelLines {
    type Reader = ChannelReader;
    type Writer = ChannelWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (ChannelReader(self.rx), ChannelWriter(self.tx))
    }
}

#[async_trait]
impl LineReader for ChannelReader {
    async fn read_line(&mut self) -> Result<Option<String>, McpError> {
        Ok(self.0.recv().await)
    }
}

#[async_trait]
impl LineWriter for ChannelWriter {
    async fn write_line(&mut self, line: &str) -> Result<(), McpError> {
        self.0
            .send(line.to_string())
            .await
            .map_err(|_| McpError::Transport("channel closed".to_string()))
    }
}
