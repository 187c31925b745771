//! Framing: length-prefix (4 bytes LE) + bincode payload.

use crate::protocol::Frame;

pub const LEN_SIZE: usize = 4;
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024; // 16 MiB

/// Encode a frame: 4 bytes LE length + bincode payload.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(frame).map_err(FrameEncodeError::Encode)?;
    let len = payload.len() as u32;
    if len > MAX_FRAME_LEN {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Error encoding a frame (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Decode one frame from the front of `bytes`. Returns the frame and the number of bytes consumed.
/// Returns `NeedMore` on a partial buffer; call again after more data arrives.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = frame_len([bytes[0], bytes[1], bytes[2], bytes[3]])?;
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let frame = decode_body(&bytes[LEN_SIZE..LEN_SIZE + len])?;
    Ok((frame, LEN_SIZE + len))
}

/// Validate a length prefix read off a stream.
pub fn frame_len(prefix: [u8; LEN_SIZE]) -> Result<usize, FrameDecodeError> {
    let len = u32::from_le_bytes(prefix);
    if len > MAX_FRAME_LEN {
        return Err(FrameDecodeError::TooLarge);
    }
    Ok(len as usize)
}

/// Decode a frame body whose length prefix was already consumed.
pub fn decode_body(body: &[u8]) -> Result<Frame, FrameDecodeError> {
    bincode::deserialize(body).map_err(FrameDecodeError::Decode)
}

/// Error decoding a frame (need more bytes, too large, or bincode failure).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PeerId;
    use crate::protocol::{PROTOCOL_VERSION, SERVICE_TYPE};

    #[test]
    fn roundtrip_beacon() {
        let peer = PeerId::generate("host");
        let frame = encode_frame(&Frame::beacon(peer.clone(), 45689)).unwrap();
        let (decoded, n) = decode_frame(&frame).unwrap();
        assert_eq!(n, frame.len());
        match decoded {
            Frame::Beacon {
                protocol_version,
                service,
                peer: p,
                listen_port,
            } => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(service, SERVICE_TYPE);
                assert_eq!(p, peer);
                assert_eq!(listen_port, 45689);
            }
            other => panic!("expected Beacon, got {other:?}"),
        }
    }

    #[test]
    fn partial_read_need_more() {
        let frame = encode_frame(&Frame::invite(PeerId::generate("joiner"))).unwrap();
        assert!(matches!(
            decode_frame(&frame[..2]),
            Err(FrameDecodeError::NeedMore)
        ));
        assert!(matches!(
            decode_frame(&frame[..LEN_SIZE]),
            Err(FrameDecodeError::NeedMore)
        ));
        assert!(matches!(
            decode_frame(&frame[..frame.len() - 1]),
            Err(FrameDecodeError::NeedMore)
        ));
    }

    #[test]
    fn multiple_frames() {
        let fa = encode_frame(&Frame::Payload {
            data: b"{}".to_vec(),
        })
        .unwrap();
        let fb = encode_frame(&Frame::Leave {
            peer: PeerId::generate("x"),
        })
        .unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&fa);
        buf.extend_from_slice(&fb);
        let (m1, n1) = decode_frame(&buf).unwrap();
        assert_eq!(n1, fa.len());
        let (m2, n2) = decode_frame(&buf[n1..]).unwrap();
        assert_eq!(n2, fb.len());
        assert!(matches!(m1, Frame::Payload { .. }));
        assert!(matches!(m2, Frame::Leave { .. }));
    }

    #[test]
    fn oversized_prefix_rejected() {
        let prefix = (MAX_FRAME_LEN + 1).to_le_bytes();
        assert!(matches!(frame_len(prefix), Err(FrameDecodeError::TooLarge)));
    }
}
