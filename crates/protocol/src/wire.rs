//! Wire-Format fuer Byte-Stream-Transporte
//!
//! Frame-basiertes Protokoll: Laenge (u32 big-endian) + JSON-Umschlag.
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE)                   | HubFrame  |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Dekodiert wird zu `HubFrame`, kodiert werden bereits serialisierte
//! `Bytes`: ein Fan-out serialisiert einmal und teilt den Puffer zwischen
//! allen Empfaenger-Queues.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use funkhaus_core::FunkhausError;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::HubFrame;

/// Standard-maximale Frame-Groesse (512 KB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

/// tokio-util Codec fuer `Framed`-Transporte
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn zu_gross(&self, groesse: usize) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            FunkhausError::ZuGross {
                groesse,
                maximum: self.max_frame_size,
            },
        )
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = HubFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > self.max_frame_size {
            return Err(self.zu_gross(length));
        }

        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);

        let frame = HubFrame::aus_bytes(&payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(frame))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(self.zu_gross(item.len()));
        }

        dst.reserve(LENGTH_FIELD_SIZE + item.len());
        dst.put_u32(item.len() as u32);
        dst.put_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameTyp;

    fn kodiert(frame: &HubFrame) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::new()
            .encode(frame.zu_bytes().unwrap(), &mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn laengenfeld_und_dekodieren() {
        let mut buf = kodiert(&HubFrame::ping());
        let payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(buf.len(), LENGTH_FIELD_SIZE + payload_len);

        let frame = FrameCodec::new()
            .decode(&mut buf)
            .unwrap()
            .expect("Frame erwartet");
        assert_eq!(frame.typ, FrameTyp::Ping);
        assert!(buf.is_empty());
    }

    #[test]
    fn unvollstaendiger_frame_wartet() {
        let mut buf = kodiert(&HubFrame::ping());
        let half = buf.len() / 2;
        let mut teil = buf.split_to(half);
        assert!(FrameCodec::new().decode(&mut teil).unwrap().is_none());

        let mut nur_laenge = BytesMut::from(&[0x00, 0x00][..]);
        assert!(FrameCodec::new().decode(&mut nur_laenge).unwrap().is_none());
    }

    #[test]
    fn zu_grosser_frame_abgelehnt() {
        let mut codec = FrameCodec::with_max_size(100);
        let mut buf = BytesMut::new();
        buf.put_u32(200);
        buf.put_slice(&[b'x'; 200]);
        assert!(codec.decode(&mut buf).is_err());

        let mut ziel = BytesMut::new();
        let gross = Bytes::from(vec![b'x'; 101]);
        assert!(codec.encode(gross, &mut ziel).is_err());
    }

    #[test]
    fn ungueltiges_json_ist_fehler() {
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.put_slice(b"hallo");
        let fehler = FrameCodec::new().decode(&mut buf).unwrap_err();
        assert_eq!(fehler.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn mehrere_frames_im_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for typ in [FrameTyp::Ping, FrameTyp::Pong, FrameTyp::Message] {
            codec
                .encode(HubFrame::new(typ).zu_bytes().unwrap(), &mut buf)
                .unwrap();
        }

        let typen: Vec<FrameTyp> = std::iter::from_fn(|| codec.decode(&mut buf).unwrap())
            .map(|f| f.typ)
            .collect();
        assert_eq!(typen, vec![FrameTyp::Ping, FrameTyp::Pong, FrameTyp::Message]);
    }
}
