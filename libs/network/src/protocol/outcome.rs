//! Request processing outcome

use crate::error::PipelineError;
use crate::message::RpcMessage;

/// Result of processing one request, consumed once by the response builder
#[derive(Debug)]
pub enum Outcome {
    Success(Box<dyn RpcMessage>),
    Failure(PipelineError),
}

impl Outcome {
    pub fn success(message: impl RpcMessage) -> Self {
        Outcome::Success(Box::new(message))
    }

    pub fn failure(error: impl Into<PipelineError>) -> Self {
        Outcome::Failure(error.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}
