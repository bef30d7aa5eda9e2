// Length-delimited framing over TCP.
//
// Every packet travels in one frame: a 4-byte big-endian length prefix
// followed by the payload produced by `Packet::encode`. `write_frame` and
// `read_frame` operate on raw bytes; `write_packet` and `read_packet` add the
// packet codec on top.
//
// `MAX_FRAME_SIZE` (16 MB) protects against unbounded allocation from
// malformed or malicious length prefixes. Command tables and item registries
// in `StartGame` are the largest expected frames.

use std::io::{self, Read, Write};

use crate::packet::{CodecError, Packet};

/// Maximum allowed frame size (16 MB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Errors from reading or writing a framed packet.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Write a length-delimited frame: 4-byte big-endian length, then payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = payload.len();
    let len = match u32::try_from(len) {
        Ok(len) if len <= MAX_FRAME_SIZE => len,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
            ));
        }
    };
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read a length-delimited frame.
///
/// Returns `UnexpectedEof` if the stream closes before or during a frame and
/// `InvalidData` if the length exceeds `MAX_FRAME_SIZE`.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Encode and write one packet.
pub fn write_packet<W: Write>(writer: &mut W, packet: &Packet) -> Result<(), WireError> {
    let payload = packet.encode()?;
    write_frame(writer, &payload)?;
    Ok(())
}

/// Read and decode one packet.
pub fn read_packet<R: Read>(reader: &mut R) -> Result<Packet, WireError> {
    let payload = read_frame(reader)?;
    Ok(Packet::decode(&payload)?)
}
