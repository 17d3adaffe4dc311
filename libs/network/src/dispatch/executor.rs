//! Business-logic execution
//!
//! ## Purpose
//!
//! The [`Executor`] seam is where a request leaves the I/O path. The
//! dispatcher calls [`Executor::execute`] and returns immediately; the
//! executor answers later, from any thread, through the [`Responder`].
//!
//! [`TaskExecutor`] is the standard implementation: it runs an async
//! [`RequestHandler`] as a task on a separate runtime (the worker pool),
//! bounds concurrent handlers with a semaphore, and turns handler errors and
//! panics into `ExecutionFailure` responses.
//!
//! ## Architecture Role
//!
//! ```text
//! connection task ──dispatch──→ TaskExecutor::execute ──spawn──→ worker runtime
//!       ↑ (returns at once)                                        │
//!       └──────── ConnectionHandle::send_response ←── Responder ←──┘
//! ```

use crate::config::ExecutorConfig;
use crate::dispatch::registry::{typed_deserializer, HandlerRegistry};
use crate::dispatch::responder::Responder;
use crate::error::{ExecutionError, Result, TransportError};
use crate::message::{RpcMessage, TypedMessage};
use crate::protocol::Outcome;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// Runs decoded requests; must answer every `responder` exactly once
pub trait Executor: Send + Sync {
    fn execute(&self, message: Box<dyn RpcMessage>, responder: Responder);
}

/// Async business logic
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        message: Box<dyn RpcMessage>,
    ) -> std::result::Result<Box<dyn RpcMessage>, ExecutionError>;
}

/// Executor running a [`RequestHandler`] on a tokio runtime
pub struct TaskExecutor {
    runtime: Handle,
    handler: Arc<dyn RequestHandler>,
    permits: Arc<Semaphore>,
}

impl TaskExecutor {
    pub fn new(runtime: Handle, handler: Arc<dyn RequestHandler>, max_in_flight: usize) -> Self {
        Self {
            runtime,
            handler,
            permits: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// Handlers currently allowed to start
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Executor for TaskExecutor {
    fn execute(&self, message: Box<dyn RpcMessage>, responder: Responder) {
        let handler = self.handler.clone();
        let permits = self.permits.clone();

        self.runtime.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    responder.fail(ExecutionError::new("executor is shutting down"));
                    return;
                }
            };

            let request_id = responder.context().request_id();
            match AssertUnwindSafe(handler.handle(message))
                .catch_unwind()
                .await
            {
                Ok(Ok(reply)) => responder.respond(Outcome::Success(reply)),
                Ok(Err(err)) => {
                    debug!(request_id = %request_id, error = %err, "Handler failed");
                    responder.fail(err);
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!(request_id = %request_id, panic = %reason, "Handler panicked");
                    responder.fail(ExecutionError::new(format!("handler panicked: {reason}")));
                }
            }
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

type RouteFn = Box<
    dyn Fn(Box<dyn RpcMessage>) -> BoxFuture<'static, std::result::Result<Box<dyn RpcMessage>, ExecutionError>>
        + Send
        + Sync,
>;

struct Route {
    handle: RouteFn,
    deserializer: fn(&[u8]) -> std::result::Result<Box<dyn RpcMessage>, crate::error::PayloadError>,
}

/// [`RequestHandler`] routing each message type to a typed async function
#[derive(Default)]
pub struct HandlerRouter {
    routes: HashMap<&'static str, Route>,
}

impl HandlerRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `Req` to `handler`
    pub fn route<Req, Resp, F, Fut>(mut self, handler: F) -> Self
    where
        Req: TypedMessage,
        Resp: RpcMessage,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Resp, ExecutionError>> + Send + 'static,
    {
        let handle: RouteFn = Box::new(move |message: Box<dyn RpcMessage>| {
            match message.downcast::<Req>() {
                Some(request) => handler(*request)
                    .map(|result| result.map(|reply| Box::new(reply) as Box<dyn RpcMessage>))
                    .boxed(),
                None => futures::future::ready(Err(ExecutionError::new(format!(
                    "route for '{}' received another message type",
                    Req::MESSAGE_TYPE
                ))))
                .boxed(),
            }
        });

        self.routes.insert(
            Req::MESSAGE_TYPE,
            Route {
                handle,
                deserializer: typed_deserializer::<Req>,
            },
        );
        self
    }

    /// Registry with a deserializer for every routed type
    pub fn registry(&self) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        for (message_type, route) in &self.routes {
            registry.register_deserializer(*message_type, route.deserializer);
        }
        registry
    }

    pub fn message_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.routes.keys().copied()
    }
}

#[async_trait]
impl RequestHandler for HandlerRouter {
    async fn handle(
        &self,
        message: Box<dyn RpcMessage>,
    ) -> std::result::Result<Box<dyn RpcMessage>, ExecutionError> {
        let route = self.routes.get(message.message_type()).ok_or_else(|| {
            ExecutionError::new(format!("no route for '{}'", message.message_type()))
        })?;
        (route.handle)(message).await
    }
}

/// Dedicated multi-threaded runtime for business logic
pub struct WorkerPool {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl WorkerPool {
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("rpc-worker")
            .enable_all()
            .build()
            .map_err(|e| TransportError::network_with_source("Failed to start worker pool", e))?;
        let handle = runtime.handle().clone();

        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Stop the workers without blocking; unfinished requests are answered
    /// with `ExecutionFailure` as their tasks are dropped
    pub fn shutdown(mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
