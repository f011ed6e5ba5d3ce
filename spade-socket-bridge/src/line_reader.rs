//! Line Reader.
//!
//! Pulls bytes from either a connected Unix-domain stream socket or the
//! process's standard input, and hands back one logical line per call with
//! the trailing `\n` stripped. A partial trailing line is preserved across
//! calls.

use std::io::{self, Read, Stdin};
use std::os::unix::net::UnixStream;
use std::path::Path;

use log::warn;

/// Minimum accumulation buffer size: the audit subsystem guarantees a
/// single line stays under this bound.
pub const BUFFER_LEN: usize = 10_000;

enum Source {
    Socket(UnixStream),
    Stdin(Stdin),
}

impl Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Socket(s) => s.read(buf),
            Source::Stdin(s) => s.read(buf),
        }
    }

    fn is_socket(&self) -> bool {
        matches!(self, Source::Socket(_))
    }
}

/// Pull-style reader: `next_line()` returns one line at a time.
pub struct LineReader {
    source: Source,
    /// Unconsumed bytes carried over from the previous read (no newline in
    /// them yet).
    remain: Vec<u8>,
}

impl LineReader {
    pub fn connect_socket(path: &Path) -> io::Result<Self> {
        let stream = UnixStream::connect(path)?;
        Ok(Self {
            source: Source::Socket(stream),
            remain: Vec::with_capacity(BUFFER_LEN),
        })
    }

    pub fn stdin() -> Self {
        Self {
            source: Source::Stdin(io::stdin()),
            remain: Vec::with_capacity(BUFFER_LEN),
        }
    }

    /// Return the next logical line (without its trailing `\n`), `Ok(None)`
    /// on a clean end-of-stream (standard input only), or an `Err` for any
    /// I/O failure — including an unexpected socket closure, which is
    /// treated as fatal regardless of how much was already read.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(idx) = self.remain.iter().position(|&b| b == b'\n') {
                let mut line_bytes: Vec<u8> = self.remain.drain(..=idx).collect();
                line_bytes.pop(); // drop the newline itself
                return Ok(Some(String::from_utf8_lossy(&line_bytes).into_owned()));
            }

            let mut chunk = [0u8; BUFFER_LEN];
            let n = self.source.read(&mut chunk)?;

            if n == 0 {
                if self.source.is_socket() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed the connection",
                    ));
                }
                if self.remain.is_empty() {
                    return Ok(None);
                }
                // Final partial line at EOF, with no trailing newline of its own.
                let bytes = std::mem::take(&mut self.remain);
                return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
            }

            self.remain.extend_from_slice(&chunk[..n]);
            if self.remain.len() > BUFFER_LEN {
                warn!("partial line exceeded {BUFFER_LEN}-byte buffer, truncating");
                self.remain.truncate(BUFFER_LEN);
            }
        }
    }
}
