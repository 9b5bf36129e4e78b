use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, FrameConfig};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for length-prefixed frames.
///
/// Wrap a stream with `Framed::new(stream, FrameCodec::new())` to get a
/// `Stream<Item = Result<Bytes>>` + `Sink<Bytes>` of whole payloads.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    config: FrameConfig,
}

impl FrameCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        decode_frame(src, self.config.max_payload_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.len(),
                max: self.config.max_payload_size,
            });
        }
        encode_frame(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::HEADER_SIZE;

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FramedWrite::new(client, FrameCodec::new());
        let mut reader = FramedRead::new(server, FrameCodec::new());

        writer.send(Bytes::from_static(b"ping")).await.unwrap();
        writer.send(Bytes::from_static(b"pong")).await.unwrap();

        assert_eq!(reader.next().await.unwrap().unwrap().as_ref(), b"ping");
        assert_eq!(reader.next().await.unwrap().unwrap().as_ref(), b"pong");
    }

    #[tokio::test]
    async fn byte_by_byte_stream_yields_whole_frames() {
        let mut wire = BytesMut::new();
        encode_frame(b"slow", &mut wire).unwrap();
        encode_frame(&[7u8; 100], &mut wire).unwrap();

        let (mut client, server) = tokio::io::duplex(1);
        let feeder = tokio::spawn(async move {
            for byte in wire.iter() {
                client.write_all(&[*byte]).await.unwrap();
            }
        });

        let mut reader = FramedRead::new(server, FrameCodec::new());
        let first = reader.next().await.unwrap().unwrap();
        let second = reader.next().await.unwrap().unwrap();
        assert_eq!(first.as_ref(), b"slow");
        assert_eq!(second.as_ref(), &[7u8; 100][..]);

        feeder.await.unwrap();
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_is_connection_closed() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&16u32.to_be_bytes()).await.unwrap();
        client.write_all(b"only-part").await.unwrap();
        drop(client);

        let mut reader = FramedRead::new(server, FrameCodec::new());
        let err = reader.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn oversized_frame_in_stream() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&1024u32.to_be_bytes()).await.unwrap();

        let config = FrameConfig {
            max_payload_size: 16,
        };
        let mut reader = FramedRead::new(server, FrameCodec::with_config(config));
        let err = reader.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 1024, max: 16 }));
    }

    #[test]
    fn encoder_rejects_oversized_payload() {
        let mut codec = FrameCodec::with_config(FrameConfig {
            max_payload_size: 4,
        });
        let mut dst = BytesMut::new();

        let err = codec
            .encode(Bytes::from_static(b"too long"), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 8, max: 4 }));
        assert!(dst.is_empty());

        codec.encode(Bytes::from_static(b"ok"), &mut dst).unwrap();
        assert_eq!(dst.len(), HEADER_SIZE + 2);
    }
}
