use bytes::{Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::domain::job::job::JobCommand;
use crate::error::{Error, Result};

/// Combines LengthDelimitedCodec (framing) with Bincode (serialization) for job invocations.
pub struct JobCodec {
    codec: LengthDelimitedCodec,
}

impl JobCodec {
    pub fn new() -> Self {
        Self { codec: LengthDelimitedCodec::new() }
    }
}

impl Default for JobCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<JobCommand> for JobCodec {
    type Error = io::Error;

    fn encode(&mut self, item: JobCommand, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        let bytes = bincode::serialize(&item).map_err(io::Error::other)?;
        self.codec.encode(Bytes::from(bytes), dst)
    }
}

impl Decoder for JobCodec {
    type Item = JobCommand;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        match self.codec.decode(src)? {
            Some(bytes) => {
                let item = bincode::deserialize(&bytes).map_err(io::Error::other)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

/// Encodes one command into a standalone frame.
pub fn encode_frame(command: &JobCommand) -> Result<Bytes> {
    let mut buffer = BytesMut::new();
    JobCodec::new().encode(command.clone(), &mut buffer).map_err(|e| Error::CodecError(e.to_string()))?;
    Ok(buffer.freeze())
}

/// Decodes a frame produced by [`encode_frame`].
pub fn decode_frame(frame: &Bytes) -> Result<JobCommand> {
    let mut buffer = BytesMut::from(&frame[..]);
    JobCodec::new()
        .decode(&mut buffer)
        .map_err(|e| Error::CodecError(e.to_string()))?
        .ok_or_else(|| Error::CodecError("incomplete frame".to_string()))
}
