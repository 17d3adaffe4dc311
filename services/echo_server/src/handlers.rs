//! Demo message types and their handlers

use network::{ExecutionError, HandlerRouter, TypedMessage};
use serde::{Deserialize, Serialize};

/// Returned unchanged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Echo {
    pub text: String,
}

impl TypedMessage for Echo {
    const MESSAGE_TYPE: &'static str = "demo.Echo";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Add {
    pub a: i64,
    pub b: i64,
}

impl TypedMessage for Add {
    const MESSAGE_TYPE: &'static str = "demo.Add";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sum {
    pub value: i64,
}

impl TypedMessage for Sum {
    const MESSAGE_TYPE: &'static str = "demo.Sum";
}

pub async fn echo(request: Echo) -> Result<Echo, ExecutionError> {
    Ok(request)
}

pub async fn add(request: Add) -> Result<Sum, ExecutionError> {
    request
        .a
        .checked_add(request.b)
        .map(|value| Sum { value })
        .ok_or_else(|| ExecutionError::new(format!("{} + {} overflows i64", request.a, request.b)))
}

pub fn router() -> HandlerRouter {
    HandlerRouter::new().route(echo).route(add)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add() {
        assert_eq!(add(Add { a: 40, b: 2 }).await.unwrap(), Sum { value: 42 });
    }

    #[tokio::test]
    async fn test_add_overflow_is_an_execution_error() {
        let err = add(Add { a: i64::MAX, b: 1 }).await.unwrap_err();
        assert!(err.message().contains("overflows"));
    }

    #[test]
    fn test_router_covers_demo_types() {
        let router = router();
        let registry = router.registry();
        assert!(registry.contains(Echo::MESSAGE_TYPE));
        assert!(registry.contains(Add::MESSAGE_TYPE));
        assert!(!registry.contains(Sum::MESSAGE_TYPE));
    }
}
