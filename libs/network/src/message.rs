//! Application message traits
//!
//! The pipeline moves decoded requests around as `Box<dyn RpcMessage>`: it
//! only needs the type name and a way to serialise the response payload.
//! Concrete message types implement [`TypedMessage`] and get the rest from
//! the blanket impl, with payloads encoded by `bincode`.

use crate::error::PayloadError;
use bincode::Options;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;

/// Type-erased application message
pub trait RpcMessage: Any + Send + fmt::Debug {
    /// Fully-qualified type name written into the envelope
    fn message_type(&self) -> &str;

    /// Serialise the message into envelope payload bytes
    fn encode_payload(&self) -> Result<Bytes, PayloadError>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl dyn RpcMessage {
    /// Recover the concrete message, `None` if it is another type
    pub fn downcast<T: RpcMessage>(self: Box<Self>) -> Option<Box<T>> {
        self.into_any().downcast::<T>().ok()
    }

    pub fn is<T: RpcMessage>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Statically named message with a serde payload
pub trait TypedMessage: Serialize + DeserializeOwned + Send + fmt::Debug + 'static {
    const MESSAGE_TYPE: &'static str;
}

impl<T: TypedMessage> RpcMessage for T {
    fn message_type(&self) -> &str {
        T::MESSAGE_TYPE
    }

    fn encode_payload(&self) -> Result<Bytes, PayloadError> {
        encode_typed(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

fn payload_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode a payload with the pipeline's bincode settings
pub fn encode_typed<T: Serialize + ?Sized>(message: &T) -> Result<Bytes, PayloadError> {
    payload_options()
        .serialize(message)
        .map(Bytes::from)
        .map_err(|e| PayloadError::Encode(e.to_string()))
}

/// Decode a payload; trailing bytes are an error
pub fn decode_typed<T: DeserializeOwned>(payload: &[u8]) -> Result<T, PayloadError> {
    payload_options()
        .deserialize(payload)
        .map_err(|e| PayloadError::Decode(e.to_string()))
}
