//! Target connection abstraction. Grounded on
//! `original_source/boofuzz/sessions.py`'s `transmit()`, which treats a
//! `ConnectionResetError`/`ConnectionAbortedError` from the underlying
//! socket as distinct, optionally-ignorable outcomes rather than a bare
//! I/O error.

use crate::error::{FuzzResult, TransientTargetError};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// A connection to the target under test. Implement this for any
/// transport (TCP, UDP, a serial port, an in-process handler) the dialog
/// is played over.
pub trait Transport {
    fn open(&mut self) -> FuzzResult<()>;
    fn close(&mut self) -> FuzzResult<()>;
    fn send(&mut self, data: &[u8]) -> FuzzResult<()>;
    /// Receive a response. An empty `Vec` is a valid (empty) response,
    /// distinct from a transient error.
    fn recv(&mut self, max_len: usize) -> FuzzResult<Vec<u8>>;
}

/// Default concrete transport: a plain TCP connection, reopened on every
/// `open()` call (a fuzz target is typically restarted between cases, so
/// the connection cannot be kept warm across them).
pub struct TcpTransport {
    host: String,
    port: u16,
    recv_timeout: Duration,
    send_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            recv_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
            stream: None,
        }
    }

    pub fn with_timeouts(mut self, send: Duration, recv: Duration) -> Self {
        self.send_timeout = send;
        self.recv_timeout = recv;
        self
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> FuzzResult<()> {
        // Mapped explicitly rather than via `?`'s blanket `From<io::Error>`:
        // a failure here means the target could never be reached at all,
        // which callers need to tell apart from a reset/abort mid-case and
        // from a session-state persistence failure.
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(crate::error::FuzzError::TargetConnection)?;
        stream
            .set_write_timeout(Some(self.send_timeout))
            .map_err(crate::error::FuzzError::TargetConnection)?;
        stream
            .set_read_timeout(Some(self.recv_timeout))
            .map_err(crate::error::FuzzError::TargetConnection)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> FuzzResult<()> {
        self.stream = None;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> FuzzResult<()> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            crate::error::FuzzError::Configuration("send() called before open()".into())
        })?;
        match stream.write_all(data) {
            Ok(()) => Ok(()),
            Err(e) => Err(classify_io_error(e).into()),
        }
    }

    fn recv(&mut self, max_len: usize) -> FuzzResult<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            crate::error::FuzzError::Configuration("recv() called before open()".into())
        })?;
        let mut buf = vec![0u8; max_len];
        match stream.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            // a timed-out read is an empty response, not a transient error:
            // the caller decides whether an empty recv is acceptable via
            // `check_data_received_each_request`.
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(classify_io_error(e).into()),
        }
    }
}

fn classify_io_error(e: std::io::Error) -> TransientTargetError {
    let errno = e.raw_os_error().unwrap_or(0);
    match e.kind() {
        ErrorKind::ConnectionReset => TransientTargetError::ConnectionReset {
            errno,
            message: e.to_string(),
        },
        ErrorKind::ConnectionAborted => TransientTargetError::ConnectionAborted {
            errno,
            message: e.to_string(),
        },
        _ => TransientTargetError::ConnectionReset {
            errno,
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn classifies_reset_and_aborted_distinctly() {
        let reset = classify_io_error(io::Error::from(ErrorKind::ConnectionReset));
        assert!(matches!(reset, TransientTargetError::ConnectionReset { .. }));
        let aborted = classify_io_error(io::Error::from(ErrorKind::ConnectionAborted));
        assert!(matches!(aborted, TransientTargetError::ConnectionAborted { .. }));
    }
}
