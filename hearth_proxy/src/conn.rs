// One framed packet connection (client-facing or server-facing).
//
// `Conn` owns a `TcpStream` and splits it into a buffered reader and a
// buffered writer, each behind its own mutex. A session has exactly one
// reader per connection (its relay loop for that direction), but writes come
// from both relay loops and from handlers, so the writer lock keeps frames
// from interleaving.
//
// `close` shuts the socket down in both directions, which unblocks a read
// pending on another thread. It is idempotent.

use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hearth_protocol::framing::{WireError, read_packet, write_packet};
use hearth_protocol::packet::{CodecError, Disconnect, Packet};
use parking_lot::Mutex;
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed packet: {0}")]
    Codec(#[from] CodecError),
    #[error("peer disconnected: {0}")]
    Disconnected(String),
    #[error("connection closed")]
    Closed,
    #[error("expected {expected}, got packet {got:#04x}")]
    Unexpected { expected: &'static str, got: u32 },
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

impl From<WireError> for ConnError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(e) => ConnError::Io(e),
            WireError::Codec(e) => ConnError::Codec(e),
        }
    }
}

impl ConnError {
    /// True for the ordinary ways a peer goes away. These are not logged as
    /// errors.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ConnError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
            ),
            ConnError::Disconnected(_) | ConnError::Closed => true,
            ConnError::Codec(_) | ConnError::Unexpected { .. } | ConnError::Timeout(_) => false,
        }
    }
}

pub struct Conn {
    stream: TcpStream,
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<BufWriter<TcpStream>>,
    peer: SocketAddr,
    closed: AtomicBool,
}

impl Conn {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            stream,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            peer,
            closed: AtomicBool::new(false),
        })
    }

    /// Connect to `addr` with a timeout.
    pub fn connect(addr: SocketAddr, timeout: Duration) -> io::Result<Self> {
        Self::new(TcpStream::connect_timeout(&addr, timeout)?)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), ConnError> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn read_packet(&self) -> Result<Packet, ConnError> {
        if self.is_closed() {
            return Err(ConnError::Closed);
        }
        let mut reader = self.reader.lock();
        match read_packet(&mut *reader) {
            Ok(packet) => Ok(packet),
            Err(WireError::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                Err(ConnError::Timeout("packet"))
            }
            Err(_) if self.is_closed() => Err(ConnError::Closed),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_packet(&self, packet: &Packet) -> Result<(), ConnError> {
        if self.is_closed() {
            return Err(ConnError::Closed);
        }
        let mut writer = self.writer.lock();
        write_packet(&mut *writer, packet)?;
        Ok(())
    }

    /// Shut the socket down. Returns true on the first call only.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        trace!(peer = %self.peer, "closing connection");
        let _ = self.stream.shutdown(Shutdown::Both);
        true
    }

    /// Send a `Disconnect` with `reason`, then close. Write failures are
    /// ignored; the peer may already be gone.
    pub fn disconnect(&self, reason: &str) {
        let _ = self.write_packet(&Packet::from(Disconnect {
            message: reason.to_string(),
            hide_screen: false,
        }));
        self.close();
    }
}
