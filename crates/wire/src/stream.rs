use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use socket2::Socket;

use crate::error::{Result, WireError};
use crate::primitives::WireEnum;

/// A boxed, independently-owned half of a secure transport.
///
/// The TLS collaborator hands the stream a connection that already
/// implements `Read + Write`; this crate never negotiates TLS itself (see
/// the crate-level docs).
#[cfg(feature = "tls")]
pub trait SecureChannel: Read + Write + Send {}

#[cfg(feature = "tls")]
impl<T: Read + Write + Send> SecureChannel for T {}

enum Transport {
    Plain {
        reader: Mutex<TcpStream>,
        writer: Mutex<TcpStream>,
        socket: Socket,
    },
    #[cfg(feature = "tls")]
    Secure {
        channel: Mutex<Box<dyn SecureChannel>>,
        socket: Socket,
    },
}

/// One logical bidirectional byte stream, over either a raw TCP socket or a
/// TLS-wrapped one.
///
/// Send and receive are independently serialized: one thread may be reading
/// while another writes, but two concurrent writers (or two concurrent
/// readers) are serialized against each other. For the plain-TCP transport
/// this is a genuine independent lock pair, backed by two socket handles
/// that share one file descriptor; the `tls` feature's [`SecureChannel`]
/// variant shares a single mutex between both directions because a TLS
/// session's record layer is not safely splittable. Both variants still
/// keep an independent `Socket` handle reserved for [`Stream::close`], so
/// shutting a stream down from outside never has to take the same lock a
/// blocked reader might be holding.
pub struct Stream {
    transport: Transport,
    sent: AtomicU64,
    received: AtomicU64,
}

impl Stream {
    /// Wraps an already-connected [`TcpStream`].
    ///
    /// # Errors
    /// Returns an error if the stream cannot be cloned into independent
    /// read/write/shutdown handles.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;
        let socket = Socket::from(stream);

        Ok(Self {
            transport: Transport::Plain {
                reader: Mutex::new(reader),
                writer: Mutex::new(writer),
                socket,
            },
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        })
    }

    /// Wraps an already-negotiated secure channel.
    ///
    /// The caller is responsible for constructing and negotiating the
    /// channel (certificate loading, handshake); this crate only consumes
    /// the resulting `Read + Write` capability. `socket` must be an
    /// independent handle onto the same underlying connection (e.g. cloned
    /// from the `TcpStream` the channel was built over) — [`Stream::close`]
    /// shuts it down directly, without taking the channel's read/write
    /// lock, so a thread parked in [`Stream::recv_raw`] can be unblocked
    /// from outside even while it holds that lock.
    #[cfg(feature = "tls")]
    pub fn from_secure(channel: Box<dyn SecureChannel>, socket: Socket) -> Self {
        Self {
            transport: Transport::Secure {
                channel: Mutex::new(channel),
                socket,
            },
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        }
    }

    /// Whether this stream is carried over TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        match &self.transport {
            Transport::Plain { .. } => false,
            #[cfg(feature = "tls")]
            Transport::Secure { .. } => true,
        }
    }

    /// Total bytes written through [`Stream::send_raw`] (and helpers built
    /// on it) since construction.
    #[must_use]
    pub fn sent_bytes(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Total bytes read through [`Stream::recv_raw`] (and helpers built on
    /// it) since construction.
    #[must_use]
    pub fn received_bytes(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Performs a best-effort shutdown of the underlying transport, to wake
    /// a peer thread blocked in [`Stream::recv_raw`].
    pub fn close(&self) {
        match &self.transport {
            Transport::Plain { socket, .. } => {
                let _ = socket.shutdown(std::net::Shutdown::Both);
            }
            #[cfg(feature = "tls")]
            Transport::Secure { socket, .. } => {
                let _ = socket.shutdown(std::net::Shutdown::Both);
            }
        }
    }

    /// Blocks until all of `bytes` have been written, looping over partial
    /// writes internally.
    ///
    /// # Errors
    /// Propagates any I/O failure from the underlying transport.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        match &self.transport {
            Transport::Plain { writer, .. } => {
                let mut writer = writer.lock().expect("send mutex poisoned");
                writer.write_all(bytes)?;
            }
            #[cfg(feature = "tls")]
            Transport::Secure { channel, .. } => {
                let mut channel = channel.lock().expect("send mutex poisoned");
                channel.write_all(bytes)?;
            }
        }

        self.sent.fetch_add(bytes.len() as u64, Ordering::Relaxed);

        Ok(())
    }

    /// Blocks until exactly `n` bytes have been read.
    ///
    /// # Errors
    /// Returns [`WireError::PeerClosed`] if the peer closes the connection
    /// before `n` bytes arrive, or propagates any other I/O failure.
    pub fn recv_raw(&self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let read_exact_result = match &self.transport {
            Transport::Plain { reader, .. } => {
                let mut reader = reader.lock().expect("recv mutex poisoned");
                reader.read_exact(&mut buf)
            }
            #[cfg(feature = "tls")]
            Transport::Secure { channel, .. } => {
                let mut channel = channel.lock().expect("recv mutex poisoned");
                channel.read_exact(&mut buf)
            }
        };

        match read_exact_result {
            Ok(()) => {
                self.received.fetch_add(n as u64, Ordering::Relaxed);
                Ok(buf)
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(WireError::PeerClosed),
            Err(err) => Err(err.into()),
        }
    }

    pub fn send_bool(&self, value: bool) -> Result<()> {
        self.send_raw(&[u8::from(value)])
    }

    pub fn recv_bool(&self) -> Result<bool> {
        Ok(self.recv_raw(1)?[0] != 0)
    }

    pub fn send_u8(&self, value: u8) -> Result<()> {
        self.send_raw(&value.to_be_bytes())
    }

    pub fn recv_u8(&self) -> Result<u8> {
        Ok(self.recv_raw(1)?[0])
    }

    pub fn send_u16(&self, value: u16) -> Result<()> {
        self.send_raw(&value.to_be_bytes())
    }

    pub fn recv_u16(&self) -> Result<u16> {
        let buf = self.recv_raw(2)?;
        Ok(u16::from_be_bytes([buf[0], buf[1]]))
    }

    pub fn send_u32(&self, value: u32) -> Result<()> {
        self.send_raw(&value.to_be_bytes())
    }

    pub fn recv_u32(&self) -> Result<u32> {
        let buf = self.recv_raw(4)?;
        Ok(u32::from_be_bytes(buf.try_into().expect("4 bytes")))
    }

    pub fn send_u64(&self, value: u64) -> Result<()> {
        self.send_raw(&value.to_be_bytes())
    }

    pub fn recv_u64(&self) -> Result<u64> {
        let buf = self.recv_raw(8)?;
        Ok(u64::from_be_bytes(buf.try_into().expect("8 bytes")))
    }

    /// Sends a `u8`-repr enum as its wire integer.
    ///
    /// # Errors
    /// Propagates I/O failures from the underlying transport.
    pub fn send_enum<E: WireEnum>(&self, value: E) -> Result<()> {
        self.send_u8(value.to_wire())
    }

    /// Receives a `u8`-repr enum, rejecting out-of-range values as a framing
    /// error per the wire contract.
    ///
    /// # Errors
    /// Returns [`WireError::Framing`] if the byte does not name a variant of
    /// `E`, or propagates I/O failures.
    pub fn recv_enum<E: WireEnum>(&self) -> Result<E> {
        let raw = self.recv_u8()?;
        E::from_wire(raw).ok_or_else(|| WireError::framing(format!("unknown enum value {raw}")))
    }

    pub fn send_blob(&self, bytes: &[u8]) -> Result<()> {
        self.send_u32(bytes.len() as u32)?;
        self.send_raw(bytes)
    }

    pub fn recv_blob(&self) -> Result<Vec<u8>> {
        let len = self.recv_u32()? as usize;
        self.recv_raw(len)
    }

    pub fn send_string(&self, value: &str) -> Result<()> {
        self.send_blob(value.as_bytes())
    }

    pub fn recv_string(&self) -> Result<String> {
        let bytes = self.recv_blob()?;
        String::from_utf8(bytes).map_err(|e| WireError::framing(format!("invalid UTF-8: {e}")))
    }

    pub fn send_path(&self, value: &str) -> Result<()> {
        self.send_string(&value.replace('\\', "/"))
    }

    pub fn recv_path(&self) -> Result<String> {
        self.recv_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn connected_pair() -> (Stream, Stream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client_thread = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server_sock, _) = listener.accept().unwrap();
        let client_sock = client_thread.join().unwrap();

        (
            Stream::from_tcp(server_sock).unwrap(),
            Stream::from_tcp(client_sock).unwrap(),
        )
    }

    #[test]
    fn raw_bytes_round_trip() {
        let (server, client) = connected_pair();

        client.send_raw(b"hello world").unwrap();
        let got = server.recv_raw(11).unwrap();

        assert_eq!(got, b"hello world");
        assert_eq!(client.sent_bytes(), 11);
        assert_eq!(server.received_bytes(), 11);
    }

    #[test]
    fn integers_round_trip_big_endian() {
        let (server, client) = connected_pair();

        client.send_u32(0x53464150).unwrap();
        assert_eq!(server.recv_u32().unwrap(), 0x5346_4150);

        client.send_u64(u64::MAX).unwrap();
        assert_eq!(server.recv_u64().unwrap(), u64::MAX);
    }

    #[test]
    fn blob_round_trips_including_empty() {
        let (server, client) = connected_pair();

        client.send_blob(&[]).unwrap();
        assert_eq!(server.recv_blob().unwrap(), Vec::<u8>::new());

        client.send_blob(b"\x00abc\x00").unwrap();
        assert_eq!(server.recv_blob().unwrap(), b"\x00abc\x00");
    }

    #[test]
    fn string_with_unicode_round_trips() {
        let (server, client) = connected_pair();

        client.send_string("héllo/ścieżka").unwrap();
        assert_eq!(server.recv_string().unwrap(), "héllo/ścieżka");
    }

    #[test]
    fn peer_close_before_expected_bytes_is_peer_closed() {
        let (server, client) = connected_pair();

        drop(client);

        match server.recv_raw(4) {
            Err(WireError::PeerClosed) => {}
            other => panic!("expected PeerClosed, got {other:?}"),
        }
    }

    #[test]
    fn send_and_recv_use_independent_locks() {
        let (server, client) = connected_pair();

        // A write from the client must not be blocked by a concurrent read
        // attempt on the same stream object.
        let server = std::sync::Arc::new(server);
        let reader = thread::spawn(move || server.recv_raw(5).unwrap());

        client.send_raw(b"abcde").unwrap();
        assert_eq!(reader.join().unwrap(), b"abcde");
    }

    #[cfg(feature = "tls")]
    #[test]
    fn close_on_secure_transport_unblocks_a_reader_holding_the_channel_lock() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client_thread = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server_sock, _) = listener.accept().unwrap();
        let client_sock = client_thread.join().unwrap();
        drop(client_sock);

        let socket = Socket::from(server_sock.try_clone().unwrap());
        let server = std::sync::Arc::new(Stream::from_secure(Box::new(server_sock), socket));

        let reader = {
            let server = server.clone();
            thread::spawn(move || server.recv_raw(5))
        };

        // Give the reader a moment to block inside `channel.lock().read_exact()`
        // before asking the stream to close from outside.
        thread::sleep(std::time::Duration::from_millis(50));
        server.close();

        assert!(matches!(reader.join().unwrap(), Err(WireError::PeerClosed)));
    }
}
