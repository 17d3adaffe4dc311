//! Request dispatch: type lookup, payload deserialisation, executor hand-off

pub mod dispatcher;
pub mod executor;
pub mod registry;
pub mod responder;

pub use dispatcher::Dispatcher;
pub use executor::{Executor, HandlerRouter, RequestHandler, TaskExecutor, WorkerPool};
pub use registry::{typed_deserializer, Deserializer, HandlerRegistry};
pub use responder::Responder;
