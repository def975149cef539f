//! Newline-delimited JSON transport over a duplex byte stream
//!
//! The reader and writer halves are independent so the serve loop can own
//! the inbound side while any number of handler tasks share the outbound
//! side. Both halves are generic over the underlying stream, which keeps
//! the whole protocol stack testable against in-memory pipes.

use crate::error::Result;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Outbound half: one JSON value per line, writes serialized under a lock.
pub struct LineWriter<W> {
    inner: Mutex<W>,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Serialize `value` as compact JSON, append `\n`, write and flush.
    ///
    /// The lock is held for the whole write so concurrent callers can
    /// never interleave two messages on the wire.
    pub async fn write(&self, value: &impl Serialize) -> Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let mut writer = self.inner.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Inbound half: a lazy sequence of parsed JSON values, one per line.
pub struct LineReader<R> {
    inner: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Next parsed value, or `None` once the stream ends.
    ///
    /// Blank lines are skipped. Lines that fail to parse are dropped
    /// without surfacing an error: the channel may carry stray
    /// non-protocol output and that must not kill the connection.
    /// A read error ends the sequence the same way EOF does.
    pub async fn next_value(&mut self) -> Option<serde_json::Value> {
        loop {
            self.line.clear();
            match self.inner.read_line(&mut self.line).await {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = self.line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str(trimmed) {
                        Ok(value) => {
                            trace!("Inbound line: {}", trimmed);
                            return Some(value);
                        }
                        Err(e) => {
                            let snippet = trimmed.chars().take(120).collect::<String>();
                            debug!("Ignoring non-JSON input ({}): {}", e, snippet);
                        }
                    }
                }
                Err(e) => {
                    debug!("Read error, ending inbound stream: {}", e);
                    return None;
                }
            }
        }
    }
}

/// Transport pair bound to the process's stdin/stdout.
pub fn stdio_transport() -> (LineReader<Stdin>, LineWriter<Stdout>) {
    (
        LineReader::new(tokio::io::stdin()),
        LineWriter::new(tokio::io::stdout()),
    )
}
