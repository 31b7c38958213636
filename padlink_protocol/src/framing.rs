// Length-prefixed framing for envelopes over a byte stream.
//
// Each frame is a 4-byte big-endian length followed by that many bytes of
// JSON. `write_frame`/`read_frame` move raw bytes only; `send_envelope` and
// `recv_envelope` add the JSON step on top for callers that want typed
// envelopes.
//
// `MAX_FRAME_SIZE` caps a single frame. Controller input and relayed game
// events are small, so 1 MiB leaves plenty of room while refusing to
// allocate whatever a corrupt length prefix claims.

use std::io::{self, Read, Write};

use crate::message::Envelope;

/// Largest frame accepted in either direction (1 MiB).
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Write one frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "frame of {} bytes exceeds limit of {MAX_FRAME_SIZE}",
                    payload.len()
                ),
            )
        })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read one frame.
///
/// A stream that closes before or inside a frame yields `UnexpectedEof`; a
/// length prefix over `MAX_FRAME_SIZE` yields `InvalidData` without reading
/// the body.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = u32::from_be_bytes(prefix);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit of {MAX_FRAME_SIZE}"),
        ));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    Ok(body)
}

/// Serialize an envelope to JSON and write it as one frame.
pub fn send_envelope<W: Write>(writer: &mut W, envelope: &Envelope) -> io::Result<()> {
    let json = serde_json::to_vec(envelope)?;
    write_frame(writer, &json)
}

/// Read one frame and decode it as an envelope. Undecodable JSON is reported
/// as `InvalidData`; the stream itself is still positioned at the next frame.
pub fn recv_envelope<R: Read>(reader: &mut R) -> io::Result<Envelope> {
    let bytes = read_frame(reader)?;
    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frames_preserve_boundaries() {
        let bodies: [&[u8]; 3] = [b"alpha", b"", b"gamma"];
        let mut wire = Vec::new();
        for body in bodies {
            write_frame(&mut wire, body).unwrap();
        }

        let mut cursor = Cursor::new(&wire);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"alpha");
        assert_eq!(read_frame(&mut cursor).unwrap(), b"");
        assert_eq!(read_frame(&mut cursor).unwrap(), b"gamma");
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_frames_rejected_both_ways() {
        let big = vec![0u8; MAX_FRAME_SIZE as usize + 1];
        let err = write_frame(&mut Vec::new(), &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let mut cursor = Cursor::new((MAX_FRAME_SIZE + 1).to_be_bytes().to_vec());
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_body_is_eof() {
        let mut wire = 10u32.to_be_bytes().to_vec();
        wire.extend_from_slice(b"short");
        let err = read_frame(&mut Cursor::new(wire)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn garbage_json_is_invalid_data_and_stream_continues() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"{not json").unwrap();
        send_envelope(&mut wire, &Envelope::new("ping", serde_json::Value::Null)).unwrap();

        let mut cursor = Cursor::new(&wire);
        let err = recv_envelope(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let next = recv_envelope(&mut cursor).unwrap();
        assert_eq!(next.event, "ping");
    }
}
