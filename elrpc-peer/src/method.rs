use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use elrpc_core::{ParamType, Value};
use futures::future::BoxFuture;
use thiserror::Error;

/// Failure raised by a method body. Travels to the caller inside a
/// `return-error` frame.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::new(message)
    }
}

/// A method body. Arguments arrive already coerced to the declared
/// parameter types; the body runs on its own task, so blocking as long
/// as it likes never stalls the dispatch loop.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn invoke(&self, args: Vec<Value>) -> Result<Value, HandlerError>;
}

type BoxedHandlerFn =
    Box<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

struct FnHandler {
    f: BoxedHandlerFn,
}

#[async_trait]
impl MethodHandler for FnHandler {
    async fn invoke(&self, args: Vec<Value>) -> Result<Value, HandlerError> {
        (self.f)(args).await
    }
}

/// One registered method: name, declared parameter types (the arity is
/// their count), handler, and the two documentation strings served by
/// the `methods` introspection request. Immutable once registered.
#[derive(Clone)]
pub struct Method {
    name: String,
    params: Vec<ParamType>,
    handler: Arc<dyn MethodHandler>,
    argdoc: String,
    docstring: String,
}

impl Method {
    /// Build a method from an async closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        params: Vec<ParamType>,
        argdoc: impl Into<String>,
        docstring: impl Into<String>,
        f: F,
    ) -> Method
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        let boxed: BoxedHandlerFn = Box::new(move |args| Box::pin(f(args)));
        Method {
            name: name.into(),
            params,
            handler: Arc::new(FnHandler { f: boxed }),
            argdoc: argdoc.into(),
            docstring: docstring.into(),
        }
    }

    /// Build a method around an existing handler object.
    pub fn from_handler(
        name: impl Into<String>,
        params: Vec<ParamType>,
        argdoc: impl Into<String>,
        docstring: impl Into<String>,
        handler: Arc<dyn MethodHandler>,
    ) -> Method {
        Method {
            name: name.into(),
            params,
            handler,
            argdoc: argdoc.into(),
            docstring: docstring.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn argdoc(&self) -> &str {
        &self.argdoc
    }

    pub fn docstring(&self) -> &str {
        &self.docstring
    }

    pub(crate) fn handler(&self) -> Arc<dyn MethodHandler> {
        Arc::clone(&self.handler)
    }

    pub fn describe(&self) -> MethodDesc {
        MethodDesc {
            name: self.name.clone(),
            argdoc: self.argdoc.clone(),
            docstring: self.docstring.clone(),
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("argdoc", &self.argdoc)
            .field("docstring", &self.docstring)
            .finish()
    }
}

/// Introspection record: one entry of a `methods` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDesc {
    pub name: String,
    pub argdoc: String,
    pub docstring: String,
}
