pub mod codec;

pub use codec::{CodecError, EpcCodec, MAX_PAYLOAD_SIZE};
