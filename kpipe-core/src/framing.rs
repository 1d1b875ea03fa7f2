//! Varint length-prefixed framing for binary protobuf over byte streams.
//!
//! Each frame is a base-128 varint (little-endian group order, high bit as
//! continuation) giving the payload length, followed by exactly that many
//! bytes. Line-delimited formats never pass through this codec.

use std::io::{self, Read, Write};

use crate::errors::FrameError;

// 10 varint bytes cover the full u64 range.
const MAX_VARINT_LEN: usize = 10;

/// Read one length-prefixed frame.
///
/// Returns `Ok(None)` on a clean end of stream, i.e. when not a single
/// varint byte could be read. A stream that ends partway through the varint
/// or the payload is a [`FrameError::Truncated`].
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError> {
    let len = match read_varint(reader)? {
        Some(len) => len as usize,
        None => return Ok(None),
    };
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(e)
        }
    })?;
    Ok(Some(payload))
}

/// Write `payload` as one length-prefixed frame.
///
/// No flushing beyond what the underlying writer provides.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    write_varint(writer, payload.len() as u64)?;
    writer.write_all(payload)
}

fn read_varint<R: Read>(reader: &mut R) -> Result<Option<u64>, FrameError> {
    let mut value = 0u64;
    let mut buf = [0u8; 1];
    for group in 0..MAX_VARINT_LEN {
        match reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return if group == 0 {
                    Ok(None)
                } else {
                    Err(FrameError::Truncated)
                };
            }
            Err(e) => return Err(FrameError::Io(e)),
        }
        value |= u64::from(buf[0] & 0x7f) << (7 * group);
        if buf[0] & 0x80 == 0 {
            return Ok(Some(value));
        }
    }
    Err(FrameError::VarintOverflow)
}

fn write_varint<W: Write>(writer: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            return writer.write_all(&[byte]);
        }
        writer.write_all(&[byte | 0x80])?;
    }
}

/// Iterator over the frames of a byte stream.
///
/// Finite (bounded by the stream length) and not restartable: every frame
/// read advances the underlying stream irreversibly.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        FrameReader { reader }
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Vec<u8>, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        read_frame(&mut self.reader).transpose()
    }
}
