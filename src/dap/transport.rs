//! DAP transport abstraction layer.
//!
//! The view core never sees a transport directly, it talks through
//! [`crate::dap::client::AdapterConn`]. The concrete transport here is TCP
//! with `Content-Length` framing, enough to drive any DAP server reachable
//! over a socket.

use anyhow::anyhow;
use serde_json::Value;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Trait for DAP message transport.
pub trait DapTransport: Send {
    /// Read a single DAP message (with Content-Length framing).
    fn read_message(&mut self) -> anyhow::Result<Value>;

    /// Write a single DAP message (with Content-Length framing).
    fn write_message(&mut self, message: &Value) -> anyhow::Result<()>;
}

/// TCP-based DAP transport.
///
/// A read timeout bounds every adapter call: a hung adapter surfaces as an
/// I/O error instead of leaving the caller blocked forever.
pub struct TcpTransport {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream, read_timeout: Option<Duration>) -> anyhow::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(read_timeout)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }
}

impl DapTransport for TcpTransport {
    fn read_message(&mut self) -> anyhow::Result<Value> {
        let mut content_length: Option<usize> = None;
        loop {
            let mut line = String::new();
            let read_n = self.reader.read_line(&mut line)?;
            if read_n == 0 {
                return Err(anyhow!("DAP connection closed"));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            if let Some(v) = line.strip_prefix("Content-Length:") {
                content_length = Some(v.trim().parse()?);
            }
        }

        let len = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        let msg: Value = serde_json::from_slice(&buf)?;
        Ok(msg)
    }

    fn write_message(&mut self, message: &Value) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(message)?;
        write!(self.stream, "Content-Length: {}\r\n\r\n", payload.len())?;
        self.stream.write_all(&payload)?;
        self.stream.flush()?;
        Ok(())
    }
}
