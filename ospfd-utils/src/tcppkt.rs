//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Packet-based service over a TCP stream.
//!
//! Every frame carries a fixed header `{version, type, subtype, length}`
//! followed by `length` bytes of body. The same framing is shared by the
//! simulator control channel and the monitor protocol.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const TCPPKT_VERS: u16 = 1;
pub const HDR_LENGTH: usize = 8;

// Decoded frame header (the version and length fields are consumed by the
// codec itself).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameHdr {
    pub pkt_type: u16,
    pub subtype: u16,
}

// Reads one full frame, suspending on short reads.
pub async fn read_frame<R>(stream: &mut R) -> io::Result<(FrameHdr, Bytes)>
where
    R: AsyncRead + Unpin,
{
    let mut hdr = [0u8; HDR_LENGTH];
    stream.read_exact(&mut hdr).await?;

    let version = u16::from_be_bytes([hdr[0], hdr[1]]);
    if version != TCPPKT_VERS {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported tcppkt version {version}"),
        ));
    }
    let pkt_type = u16::from_be_bytes([hdr[2], hdr[3]]);
    let subtype = u16::from_be_bytes([hdr[4], hdr[5]]);
    let length = u16::from_be_bytes([hdr[6], hdr[7]]) as usize;

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await?;

    Ok((FrameHdr { pkt_type, subtype }, Bytes::from(body)))
}

// Writes one full frame.
pub async fn write_frame<W>(
    stream: &mut W,
    pkt_type: u16,
    subtype: u16,
    body: &[u8],
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let length = u16::try_from(body.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "frame body too large")
    })?;

    let mut frame = Vec::with_capacity(HDR_LENGTH + body.len());
    frame.extend_from_slice(&TCPPKT_VERS.to_be_bytes());
    frame.extend_from_slice(&pkt_type.to_be_bytes());
    frame.extend_from_slice(&subtype.to_be_bytes());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(body);

    stream.write_all(&frame).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(256);

        write_frame(&mut client, 7, 42, b"hello").await.unwrap();
        let (hdr, body) = read_frame(&mut server).await.unwrap();
        assert_eq!(
            hdr,
            FrameHdr {
                pkt_type: 7,
                subtype: 42
            }
        );
        assert_eq!(body.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn empty_body() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_frame(&mut client, 1, 0, &[]).await.unwrap();
        let (hdr, body) = read_frame(&mut server).await.unwrap();
        assert_eq!(hdr.pkt_type, 1);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn version_mismatch_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let bad = [0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        tokio::io::AsyncWriteExt::write_all(&mut client, &bad)
            .await
            .unwrap();
        assert!(read_frame(&mut server).await.is_err());
    }
}
