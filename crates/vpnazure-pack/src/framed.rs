//! Framed pack transport: `u32` length prefix plus optional SHA-1 trailer.

use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use vpnazure_core::MAX_PACK_SIZE;

use crate::error::PackError;
use crate::pack::Pack;

/// Write a framed pack: payload length, payload, and (when `hashed`) the
/// 20-byte SHA-1 of the payload. The frame is assembled into one buffer so
/// it reaches the transport in a single write.
pub async fn send_pack<W>(writer: &mut W, pack: &Pack, hashed: bool) -> Result<(), PackError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let payload = pack.encode();
    let mut frame = Vec::with_capacity(4 + payload.len() + if hashed { 20 } else { 0 });
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    if hashed {
        frame.extend_from_slice(&Sha1::digest(&payload));
    }
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a framed pack, enforcing the payload size cap before buffering and
/// verifying the SHA-1 trailer when `hashed`.
pub async fn recv_pack<R>(reader: &mut R, hashed: bool) -> Result<Pack, PackError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_PACK_SIZE {
        return Err(PackError::TooLarge);
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    if hashed {
        let mut trailer = [0u8; 20];
        reader.read_exact(&mut trailer).await?;
        if Sha1::digest(&payload).as_slice() != trailer {
            return Err(PackError::ChecksumMismatch);
        }
    }

    Pack::decode(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn frame_bytes(pack: &Pack, hashed: bool) -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        send_pack(&mut out, pack, hashed).await.unwrap();
        out.into_inner()
    }

    fn sample_pack() -> Pack {
        let mut pack = Pack::new();
        pack.insert_str("opcode", "relay");
        pack.insert_data("session_id", vec![7u8; 20]);
        pack.insert_u32("client_port", 51820);
        pack
    }

    #[tokio::test]
    async fn hashed_round_trip() {
        let frame = frame_bytes(&sample_pack(), true).await;
        let decoded = recv_pack(&mut &frame[..], true).await.unwrap();
        assert_eq!(decoded.get_str("opcode"), Some("relay"));
        assert_eq!(decoded.get_u32("client_port"), Some(51820));
    }

    #[tokio::test]
    async fn unhashed_round_trip() {
        let frame = frame_bytes(&sample_pack(), false).await;
        let decoded = recv_pack(&mut &frame[..], false).await.unwrap();
        assert_eq!(decoded.get_data("session_id"), Some(&[7u8; 20][..]));
    }

    #[tokio::test]
    async fn payload_tampering_is_detected() {
        let pristine = frame_bytes(&sample_pack(), true).await;
        for i in 4..pristine.len() - 20 {
            let mut frame = pristine.clone();
            frame[i] ^= 0x40;
            let result = recv_pack(&mut &frame[..], true).await;
            assert!(
                matches!(result, Err(PackError::ChecksumMismatch)),
                "flip at {i} must be detected"
            );
        }
    }

    #[tokio::test]
    async fn trailer_tampering_is_detected() {
        let mut frame = frame_bytes(&sample_pack(), true).await;
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        let result = recv_pack(&mut &frame[..], true).await;
        assert!(matches!(result, Err(PackError::ChecksumMismatch)));
    }

    #[tokio::test]
    async fn length_cap_is_enforced_before_reading() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&(MAX_PACK_SIZE as u32 + 1).to_be_bytes());
        let result = recv_pack(&mut &frame[..], true).await;
        assert!(matches!(result, Err(PackError::TooLarge)));
    }

    #[tokio::test]
    async fn payload_at_exact_cap_is_accepted() {
        // A single "k" => data entry has 21 bytes of structure around the
        // value, so a value of MAX_PACK_SIZE - 21 pads the payload to the cap.
        let mut pack = Pack::new();
        pack.insert_data("k", vec![0xEE; MAX_PACK_SIZE - 21]);
        let frame = frame_bytes(&pack, true).await;
        assert_eq!(
            u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize,
            MAX_PACK_SIZE
        );
        assert!(recv_pack(&mut &frame[..], true).await.is_ok());
    }

    #[tokio::test]
    async fn payload_one_past_cap_is_rejected() {
        let mut pack = Pack::new();
        pack.insert_data("k", vec![0xEE; MAX_PACK_SIZE - 20]);
        let frame = frame_bytes(&pack, true).await;
        assert_eq!(
            u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize,
            MAX_PACK_SIZE + 1
        );
        let result = recv_pack(&mut &frame[..], true).await;
        assert!(matches!(result, Err(PackError::TooLarge)));
    }

    #[tokio::test]
    async fn truncated_frame_is_an_io_error() {
        let frame = frame_bytes(&sample_pack(), true).await;
        let result = recv_pack(&mut &frame[..frame.len() - 5], true).await;
        assert!(matches!(result, Err(PackError::Io(_))));
    }
}
