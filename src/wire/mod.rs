use events::GearmanEvent;
use protocol::Outbound;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{self, Framed};

pub mod admin;
pub mod decoder;
pub mod encoder;
pub mod events;
pub mod protocol;

pub fn framed<T: AsyncRead + AsyncWrite>(stream: T) -> Framed<T, Codec> {
    Framed::new(stream, Codec::default())
}

#[derive(Default)]
pub struct Codec {
    d: decoder::Decoder,
    e: encoder::Encoder,
}

impl codec::Decoder for Codec {
    type Item = GearmanEvent;
    type Error = decoder::Error;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.d.decode(src)
    }
}

impl codec::Encoder<Outbound> for Codec {
    type Error = encoder::Error;

    fn encode(&mut self, item: Outbound, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
        self.e.encode(item, dst)
    }
}
