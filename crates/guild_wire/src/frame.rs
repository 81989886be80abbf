//! Length-prefixed framing over any async byte stream.
//!
//! A frame is a big-endian `u32` payload length followed by that many
//! payload bytes. A clean close between frames surfaces as
//! [`WireError::Eof`] so callers can tell an orderly shutdown from a
//! connection that died mid-frame.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WireError;

/// Upper bound on a single frame payload. Anything larger is treated as
/// a corrupt stream and the connection should be dropped.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Writes one `payload` as a length-prefixed frame and flushes.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame payload off the stream.
///
/// Returns [`WireError::Eof`] when the peer closed the stream on a
/// frame boundary; a close inside a frame is an I/O error instead.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::Eof);
        }
        Err(e) => return Err(WireError::Io(e)),
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_round_trip_in_order() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_frame(&mut client, b"first").await.unwrap();
        write_frame(&mut client, b"").await.unwrap();
        write_frame(&mut client, b"third").await.unwrap();

        assert_eq!(read_frame(&mut server).await.unwrap(), b"first");
        assert_eq!(read_frame(&mut server).await.unwrap(), b"");
        assert_eq!(read_frame(&mut server).await.unwrap(), b"third");
    }

    #[tokio::test]
    async fn clean_close_reads_as_eof() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, b"last").await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server).await.unwrap(), b"last");
        assert!(matches!(read_frame(&mut server).await, Err(WireError::Eof)));
    }

    #[tokio::test]
    async fn close_inside_a_frame_is_an_io_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        // Length prefix promises 8 bytes, then the peer vanishes.
        use tokio::io::AsyncWriteExt;
        client.write_all(&8u32.to_be_bytes()).await.unwrap();
        client.write_all(b"hal").await.unwrap();
        drop(client);

        assert!(matches!(read_frame(&mut server).await, Err(WireError::Io(_))));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        let bogus = (MAX_FRAME_BYTES as u32 + 1).to_be_bytes();
        client.write_all(&bogus).await.unwrap();

        assert!(matches!(
            read_frame(&mut server).await,
            Err(WireError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn oversized_payload_is_refused_before_writing() {
        let (mut client, _server) = tokio::io::duplex(64);
        let huge = vec![0u8; MAX_FRAME_BYTES + 1];
        assert!(matches!(
            write_frame(&mut client, &huge).await,
            Err(WireError::FrameTooLarge(_))
        ));
    }
}
