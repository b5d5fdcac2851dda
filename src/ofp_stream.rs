use bytes::BytesMut;
use mio::net::TcpStream;
use mio::Token;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use io_loop::IoLoop;
use message::Message;
use ofp_header::Xid;
use ofp_message::{MessageCodec, OfpSerializationError};

pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Outbound side of a stream: one mutual-exclusion domain for the buffer and
/// the per-tick flags. `wrote` limits the stream to one flush per reactor
/// tick; `needs_select` is true exactly when unsent bytes remain after a
/// flush, meaning write-interest must be armed.
struct OutBuf {
    buf: Vec<u8>,
    capacity: usize,
    wrote: bool,
    needs_select: bool,
}

impl OutBuf {
    fn new(capacity: usize) -> OutBuf {
        OutBuf {
            buf: Vec::with_capacity(capacity),
            capacity,
            wrote: false,
            needs_select: false,
        }
    }

    fn append(&mut self, bytes: &[u8]) {
        while self.capacity - self.buf.len() < bytes.len() {
            // grow size by 50%, never shrink
            self.capacity += self.capacity / 2;
            info!("Grew outgoing buffer to size {}", self.capacity);
        }
        self.buf.extend_from_slice(bytes);
    }
}

/// Buffered message stream wrapped around a non-blocking socket.
///
/// Inbound bytes are decoded into discrete messages through the injected
/// codec, with partial trailing bytes preserved across reads. Outbound
/// messages are buffered and flushed one write syscall at a time; a flush
/// that cannot drain the buffer leaves the stream needing write-interest
/// from its owning loop. Write failures are latched, never raised twice.
pub struct OfpStream {
    conn: TcpStream,
    token: Token,
    io_loop: Arc<IoLoop>,
    codec: Arc<dyn MessageCodec>,
    immediate: bool,
    peer: Option<SocketAddr>,
    in_buf: Mutex<BytesMut>,
    out: Mutex<OutBuf>,
    write_failure: AtomicBool,
    eof: AtomicBool,
}

impl OfpStream {
    pub fn new(
        conn: TcpStream,
        token: Token,
        io_loop: Arc<IoLoop>,
        codec: Arc<dyn MessageCodec>,
        immediate: bool,
    ) -> OfpStream {
        OfpStream::with_buffer_size(conn, token, io_loop, codec, immediate, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(
        conn: TcpStream,
        token: Token,
        io_loop: Arc<IoLoop>,
        codec: Arc<dyn MessageCodec>,
        immediate: bool,
        buffer_size: usize,
    ) -> OfpStream {
        let peer = conn.peer_addr().ok();
        OfpStream {
            conn,
            token,
            io_loop,
            codec,
            immediate,
            peer,
            in_buf: Mutex::new(BytesMut::new()),
            out: Mutex::new(OutBuf::new(buffer_size)),
            write_failure: AtomicBool::new(false),
            eof: AtomicBool::new(false),
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn raw_fd(&self) -> RawFd {
        self.conn.as_raw_fd()
    }

    pub fn io_loop(&self) -> &Arc<IoLoop> {
        &self.io_loop
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Decode the messages that have arrived since the last call.
    ///
    /// Returns `Ok(None)` on orderly remote close with nothing decoded. When
    /// data and the close arrive together the messages are returned and the
    /// close is latched for `reached_eof()`. The socket is drained to
    /// `WouldBlock` because the multiplexer will not repeat this readiness.
    pub fn read(&self) -> io::Result<Option<Vec<(Xid, Message)>>> {
        let mut in_buf = self.in_buf.lock().unwrap();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match (&self.conn).read(&mut chunk) {
                Ok(0) => {
                    self.eof.store(true, Ordering::Release);
                    break;
                }
                Ok(n) => in_buf.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let messages = self
            .codec
            .parse(&mut in_buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        if messages.is_empty() && self.reached_eof() {
            return Ok(None);
        }
        Ok(Some(messages))
    }

    /// True once the remote end has closed its write side.
    pub fn reached_eof(&self) -> bool {
        self.eof.load(Ordering::Acquire)
    }

    /// Buffers a single outgoing message.
    pub fn write(&self, xid: Xid, msg: &Message) -> Result<(), OfpSerializationError> {
        let bytes = self.codec.marshal(xid, msg)?;
        let mut out = self.out.lock().unwrap();
        out.append(&bytes);
        if !out.wrote && !out.needs_select {
            self.flush_locked(&mut out);
        }
        Ok(())
    }

    /// Buffers a batch of outgoing messages, flushing at most once.
    pub fn write_all(&self, msgs: &[(Xid, Message)]) -> Result<(), OfpSerializationError> {
        let mut marshaled = Vec::with_capacity(msgs.len());
        for &(xid, ref msg) in msgs {
            marshaled.push(self.codec.marshal(xid, msg)?);
        }
        let mut out = self.out.lock().unwrap();
        for bytes in &marshaled {
            out.append(bytes);
        }
        if !out.wrote && !out.needs_select {
            self.flush_locked(&mut out);
        }
        Ok(())
    }

    /// Flush buffered outgoing data. Keep flushing until `needs_flush()`
    /// returns false. Each flush corresponds to one socket write, so this is
    /// designed for one flush per multiplexer wakeup.
    pub fn flush(&self) {
        let mut out = self.out.lock().unwrap();
        self.flush_locked(&mut out);
    }

    fn flush_locked(&self, out: &mut OutBuf) {
        if !out.buf.is_empty() {
            match (&self.conn).write(&out.buf[..]) {
                Ok(n) => {
                    out.buf.drain(..n);
                }
                Err(ref e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => {
                    // Unrecoverable, generally the remote switch disconnected
                    info!("Detected remote switch hangup {:?}", self.peer);
                    self.write_failure.store(true, Ordering::Release);
                }
            }
        }
        if !self.immediate {
            out.wrote = true;
        }
        if !out.buf.is_empty() {
            out.needs_select = true;
        }
    }

    /// Is there outgoing buffered data that needs to be flushed?
    pub fn needs_flush(&self) -> bool {
        !self.out.lock().unwrap().buf.is_empty()
    }

    /// True if a write has failed, indicating the remote end is gone.
    pub fn write_failure(&self) -> bool {
        self.write_failure.load(Ordering::Acquire)
    }

    pub fn needs_select(&self) -> bool {
        self.out.lock().unwrap().needs_select
    }

    /// Per-tick reset run by the owning loop before it polls.
    pub fn clear_wrote(&self) {
        let mut out = self.out.lock().unwrap();
        out.wrote = false;
        if !out.buf.is_empty() && !out.needs_select {
            self.flush_locked(&mut out);
        }
    }

    /// Reset after a writability event: write-interest has fired, so try to
    /// drain what is buffered.
    pub fn clear_select(&self) {
        let mut out = self.out.lock().unwrap();
        out.wrote = false;
        out.needs_select = false;
        if !out.buf.is_empty() {
            self.flush_locked(&mut out);
        }
    }

    /// Shut the underlying socket down. Owned by the controller's disconnect
    /// path; the stream itself never closes the socket.
    pub fn close(&self) {
        let _ = self.conn.shutdown(Shutdown::Both);
    }
}
