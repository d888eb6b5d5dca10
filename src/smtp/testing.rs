//! In-memory connection for driving sessions in unit tests

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use crate::smtp::context::Connection;

/// Replays scripted input one chunk per read and records everything written
#[derive(Debug, Default)]
pub struct ScriptedConnection {
    chunks: VecDeque<Vec<u8>>,
    output: Vec<u8>,
    shutdowns: usize,
    peer: Option<SocketAddr>,
}

impl ScriptedConnection {
    pub fn new(input: &str) -> Self {
        Self::from_bytes(input.as_bytes().to_vec())
    }

    pub fn from_bytes(input: Vec<u8>) -> Self {
        let mut connection = Self::default();
        if !input.is_empty() {
            connection.chunks.push_back(input);
        }
        connection
    }

    pub fn with_chunks<'a>(chunks: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            chunks: chunks
                .into_iter()
                .map(|chunk| chunk.as_bytes().to_vec())
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Written lines without their CRLF terminators
    pub fn output_lines(&self) -> Vec<String> {
        self.output()
            .split_terminator("\r\n")
            .map(str::to_owned)
            .collect()
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns
    }
}

impl Read for ScriptedConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

impl Write for ScriptedConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for ScriptedConnection {
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.shutdowns += 1;
        Ok(())
    }
}
