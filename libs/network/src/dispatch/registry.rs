//! Handler registry: message type name → deserializer
//!
//! Populated at startup, then shared read-only behind an `Arc`.

use crate::error::PayloadError;
use crate::message::{decode_typed, RpcMessage, TypedMessage};
use std::collections::HashMap;
use tracing::warn;

/// Reconstructs a message from envelope payload bytes
pub trait Deserializer: Send + Sync {
    fn deserialize(&self, payload: &[u8]) -> Result<Box<dyn RpcMessage>, PayloadError>;
}

impl<F> Deserializer for F
where
    F: Fn(&[u8]) -> Result<Box<dyn RpcMessage>, PayloadError> + Send + Sync,
{
    fn deserialize(&self, payload: &[u8]) -> Result<Box<dyn RpcMessage>, PayloadError> {
        self(payload)
    }
}

/// Deserializer for a [`TypedMessage`]
pub fn typed_deserializer<T: TypedMessage>(
    payload: &[u8],
) -> Result<Box<dyn RpcMessage>, PayloadError> {
    decode_typed::<T>(payload).map(|message| Box::new(message) as Box<dyn RpcMessage>)
}

#[derive(Default)]
pub struct HandlerRegistry {
    deserializers: HashMap<String, Box<dyn Deserializer>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its [`TypedMessage::MESSAGE_TYPE`]
    pub fn register<T: TypedMessage>(&mut self) -> &mut Self {
        self.register_deserializer(T::MESSAGE_TYPE, typed_deserializer::<T>)
    }

    /// Register a custom deserializer; a later registration replaces an earlier one
    pub fn register_deserializer(
        &mut self,
        message_type: impl Into<String>,
        deserializer: impl Deserializer + 'static,
    ) -> &mut Self {
        let message_type = message_type.into();
        if self.deserializers.contains_key(&message_type) {
            warn!(message_type = %message_type, "Replacing registered deserializer");
        }
        self.deserializers
            .insert(message_type, Box::new(deserializer));
        self
    }

    pub fn lookup(&self, message_type: &str) -> Option<&dyn Deserializer> {
        self.deserializers.get(message_type).map(|d| d.as_ref())
    }

    pub fn contains(&self, message_type: &str) -> bool {
        self.deserializers.contains_key(message_type)
    }

    pub fn message_types(&self) -> impl Iterator<Item = &str> {
        self.deserializers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.deserializers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deserializers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.deserializers.keys()).finish()
    }
}
