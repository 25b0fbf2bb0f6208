//! Middleware chain composition
//!
//! A chain is an ordered list of middleware wrapped around one terminal
//! handler, composed once and reused for every message:
//!
//! ```text
//! middleware[0] -> middleware[1] -> ... -> handler
//!            <-              <-  unwind  <-
//! ```
//!
//! Each middleware receives the context and a by-value [`Next`]. Running
//! `next` continues the chain; dropping it short-circuits everything deeper.
//! Because `Next::run` consumes `self`, a node cannot invoke the rest of the
//! chain twice. Code after `next.run(..).await` executes on the unwind path,
//! in reverse registration order, on success and failure alike.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::MessageContext;
use crate::error::PipelineError;

/// Terminal business handler invoked at the innermost point of the chain.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &mut MessageContext) -> Result<(), PipelineError>;
}

/// Adapter turning an async closure into a [`Handler`].
///
/// The closure returns a boxed future borrowing the context, typically via
/// `futures::FutureExt::boxed`:
///
/// ```ignore
/// let chain = Chain::builder().handler_fn(|ctx| {
///     async move {
///         ctx.set_destination_payload(b"done");
///         Ok(())
///     }
///     .boxed()
/// });
/// ```
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut MessageContext) -> BoxFuture<'a, Result<(), PipelineError>>
        + Send
        + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut MessageContext) -> BoxFuture<'a, Result<(), PipelineError>>
        + Send
        + Sync,
{
    async fn call(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        (self.f)(ctx).await
    }
}

/// A wrapping pipeline element.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Process the context, invoking `next` to continue the chain or
    /// dropping it to short-circuit.
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        next: Next<'_>,
    ) -> Result<(), PipelineError>;
}

/// The remainder of the chain, from one middleware's point of view.
///
/// Consumed on invocation, so calling the rest of the chain more than once
/// does not compile.
pub struct Next<'a> {
    handler: &'a dyn Handler,
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// Invoke the remaining middleware and, innermost, the terminal handler.
    pub async fn run(self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        match self.rest.split_first() {
            Some((middleware, rest)) => {
                let next = Next {
                    handler: self.handler,
                    rest,
                };
                middleware.handle(ctx, next).await
            }
            None => self.handler.call(ctx).await,
        }
    }
}

/// An ordered middleware stack composed around a terminal handler.
///
/// Built once, then driven for every message; composition order is
/// registration order and never changes between invocations.
pub struct Chain {
    middleware: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn Handler>,
}

impl Chain {
    /// Start building a chain
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// Drive one context through every middleware and the terminal handler
    pub async fn execute(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        Next {
            handler: self.handler.as_ref(),
            rest: &self.middleware,
        }
        .run(ctx)
        .await
    }

    /// Number of middleware wrapped around the handler
    pub fn depth(&self) -> usize {
        self.middleware.len()
    }
}

/// Builder collecting middleware in invocation order.
#[derive(Default)]
pub struct ChainBuilder {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
        }
    }

    /// Append a middleware; earlier registrations run first on the way in
    /// and last on the way out.
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Append an already-shared middleware
    pub fn with_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Close the chain with its terminal handler
    pub fn handler<H: Handler + 'static>(self, handler: H) -> Chain {
        Chain {
            middleware: self.middleware,
            handler: Arc::new(handler),
        }
    }

    /// Close the chain with an async closure as the terminal handler
    pub fn handler_fn<F>(self, f: F) -> Chain
    where
        F: for<'a> Fn(&'a mut MessageContext) -> BoxFuture<'a, Result<(), PipelineError>>
            + Send
            + Sync
            + 'static,
    {
        self.handler(HandlerFn::new(f))
    }
}
