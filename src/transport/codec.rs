//! Frame codec (C1): 4-byte big-endian length prefix + JSON body.
//!
//! Generalizes the teacher's Noise handshake framing
//! (`montana`'s `read_handshake_msg`/`write_handshake_msg`, a 2-byte-prefixed
//! helper pair) to the full P2P frame size and prefix width used by the
//! original transport (`struct.pack("!I", len)`, i.e. `u32` big-endian).

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::TransportError;

/// Default cap on frame size when nothing else is configured (§4.3: default
/// 2 MiB). Callers thread the real limit through from `TransportConfig`
/// instead of relying on this implicitly.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 2 * 1024 * 1024;

pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    max_frame_size: usize,
) -> Result<(), TransportError> {
    if payload.len() > max_frame_size {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R, max_frame_size: usize) -> Result<Vec<u8>, TransportError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > max_frame_size {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello envelope", DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(decoded, b"hello envelope");
    }

    #[tokio::test]
    async fn oversized_frame_on_write_is_rejected() {
        let big = vec![0u8; DEFAULT_MAX_FRAME_SIZE + 1];
        let mut buf = Vec::new();
        let err = write_frame(&mut buf, &big, DEFAULT_MAX_FRAME_SIZE).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn oversized_length_prefix_on_read_is_rejected() {
        let mut buf = Vec::new();
        let bogus_len = (DEFAULT_MAX_FRAME_SIZE as u32) + 1;
        buf.extend_from_slice(&bogus_len.to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn a_smaller_configured_limit_rejects_frames_the_default_would_accept() {
        let mut buf = Vec::new();
        let err = write_frame(&mut buf, &[0u8; 128], 64).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge(_)));
    }
}
