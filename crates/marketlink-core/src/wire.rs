//! The wire framer (C1).
//!
//! Every message on the wire is `uint32be length | payload`, where the
//! payload is a sequence of fields joined by a single NUL byte with a
//! trailing NUL after the last field. The reader consumes exactly
//! `length` bytes after the prefix; the writer computes `length` from
//! the joined payload (including the trailing NUL).
//!
//! Generic over `AsyncRead`/`AsyncWrite` so the same code frames a real
//! `TcpStream` and an in-memory duplex used by tests.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Sane upper bound on a single frame's payload length. The wire
/// protocol itself carries no such limit; this guards against a
/// corrupted or malicious length prefix turning into an unbounded
/// allocation.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Failures while reading or writing a frame: either a transport-level
/// I/O failure, or a frame that doesn't parse.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type FrameResult<T> = Result<T, FrameError>;

/// Read one length-prefixed frame and split it into its NUL-terminated
/// fields, dropping the final (always-empty) element produced by the
/// trailing NUL.
pub async fn read_frame<R>(reader: &mut R) -> FrameResult<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len, MAX_FRAME_LEN).into());
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    split_payload(&payload)
}

fn split_payload(payload: &[u8]) -> FrameResult<Vec<String>> {
    let mut fields = Vec::new();
    for (idx, chunk) in payload.split(|&b| b == 0).enumerate() {
        fields.push(
            std::str::from_utf8(chunk)
                .map_err(|_| ProtocolError::InvalidUtf8(idx))?
                .to_string(),
        );
    }
    // A well-formed payload ends with a NUL, which produces one trailing
    // empty element from `split`. Drop it. An empty payload (zero-length
    // frame) produces a single empty element too; drop that as well so
    // callers see an empty field list rather than one bogus empty field.
    fields.pop();
    Ok(fields)
}

/// Serialize already-encoded field bytes into a single frame and write
/// it: the length prefix followed by the NUL-joined payload and a
/// trailing NUL.
pub async fn write_frame<W>(writer: &mut W, fields: &[Vec<u8>]) -> FrameResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = Vec::new();
    for field in fields {
        payload.extend_from_slice(field);
        payload.push(0);
    }

    let len = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::FrameTooLarge(u32::MAX, MAX_FRAME_LEN))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// The literal handshake prefix the client sends before version
/// negotiation: `API\0` followed by a length-prefixed `v<MIN>..<MAX>`.
pub async fn write_handshake<W>(writer: &mut W, min_version: i32, max_version: i32) -> FrameResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"API\0").await?;
    let versions = format!("v{}..{}", min_version, max_version);
    let len = u32::try_from(versions.len()).expect("version string is always tiny");
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(versions.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trip_fields() {
        let fields: Vec<Vec<u8>> = vec![b"49".to_vec(), b"1".to_vec(), b"1524957956".to_vec()];
        let mut buf = Vec::new();
        write_frame(&mut buf, &fields).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, vec!["49", "1", "1524957956"]);
    }

    #[tokio::test]
    async fn empty_field_round_trips() {
        let fields: Vec<Vec<u8>> = vec![b"".to_vec(), b"x".to_vec(), b"".to_vec()];
        let mut buf = Vec::new();
        write_frame(&mut buf, &fields).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, vec!["", "x", ""]);
    }

    #[tokio::test]
    async fn truncated_frame_is_io_error() {
        // Claim 10 bytes of payload but supply none.
        let mut cursor = Cursor::new(10u32.to_be_bytes().to_vec());
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(FrameError::Io(_))));
    }

    #[tokio::test]
    async fn oversized_length_prefix_rejected() {
        let mut cursor = Cursor::new((MAX_FRAME_LEN + 1).to_be_bytes().to_vec());
        let result = read_frame(&mut cursor).await;
        assert!(matches!(
            result,
            Err(FrameError::Protocol(ProtocolError::FrameTooLarge(_, _)))
        ));
    }

    #[tokio::test]
    async fn handshake_bytes_match_expected_layout() {
        let mut buf = Vec::new();
        write_handshake(&mut buf, 100, 187).await.unwrap();
        assert_eq!(&buf[0..4], b"API\0");
        let len = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        assert_eq!(&buf[8..8 + len as usize], b"v100..187");
    }
}
