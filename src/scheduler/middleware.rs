//! Onion-style middleware around task execution.
//!
//! Each middleware receives the task context and a [`Next`] continuation.
//! Awaiting `next.run()` proceeds inward (to the next middleware or the task);
//! not calling it short-circuits the chain. A chain tracks the furthest index
//! it has reached, so calling `next` twice from one layer fails with
//! [`SchedulerError::NextCalledMultipleTimes`] instead of re-running the
//! inner layers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use super::task::{Task, TaskContext, TaskResult};
use crate::error::SchedulerError;

/// Interceptor wrapped around every task execution.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, ctx: TaskContext, next: Next) -> TaskResult;
}

type MiddlewareFn = dyn Fn(TaskContext, Next) -> BoxFuture<'static, TaskResult> + Send + Sync;

struct FnMiddleware(Box<MiddlewareFn>);

#[async_trait]
impl Middleware for FnMiddleware {
    async fn handle(&self, ctx: TaskContext, next: Next) -> TaskResult {
        (self.0)(ctx, next).await
    }
}

/// Build a middleware from an async closure.
pub fn middleware_fn<F, Fut>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(TaskContext, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    Arc::new(FnMiddleware(Box::new(move |ctx, next| Box::pin(f(ctx, next)))))
}

/// State shared by every continuation of one chain invocation.
struct Chain {
    middleware: Arc<[Arc<dyn Middleware>]>,
    terminal: Task,
    ctx: TaskContext,
    furthest: Mutex<Option<usize>>,
}

impl Chain {
    fn dispatch(self: Arc<Self>, index: usize) -> BoxFuture<'static, TaskResult> {
        {
            let mut furthest = self.furthest.lock();
            if furthest.is_some_and(|reached| index <= reached) {
                return Box::pin(async { Err(SchedulerError::NextCalledMultipleTimes) });
            }
            *furthest = Some(index);
        }

        match self.middleware.get(index).cloned() {
            Some(layer) => {
                let ctx = self.ctx.clone();
                let next = Next { chain: self, index: index + 1 };
                Box::pin(async move { layer.handle(ctx, next).await })
            }
            None => (self.terminal)(self.ctx.clone()),
        }
    }
}

/// Continuation into the rest of the chain.
#[derive(Clone)]
pub struct Next {
    chain: Arc<Chain>,
    index: usize,
}

impl Next {
    /// Run the remaining middleware and the task.
    pub fn run(&self) -> BoxFuture<'static, TaskResult> {
        Arc::clone(&self.chain).dispatch(self.index)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("index", &self.index).finish()
    }
}

/// Ordered list of middleware, outermost first.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Freeze the current list into a callable chain.
    pub fn compose(&self) -> Composed {
        compose(&self.middleware)
    }
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("len", &self.middleware.len())
            .finish()
    }
}

/// A composed chain. Each [`Composed::run`] starts a fresh invocation with
/// its own furthest-index guard.
#[derive(Clone)]
pub struct Composed {
    middleware: Arc<[Arc<dyn Middleware>]>,
}

impl Composed {
    pub fn run(&self, ctx: TaskContext, terminal: Task) -> BoxFuture<'static, TaskResult> {
        let chain = Arc::new(Chain {
            middleware: Arc::clone(&self.middleware),
            terminal,
            ctx,
            furthest: Mutex::new(None),
        });
        chain.dispatch(0)
    }
}

/// Compose middleware into a single chain around a terminal task.
pub fn compose(middleware: &[Arc<dyn Middleware>]) -> Composed {
    Composed { middleware: middleware.iter().cloned().collect() }
}
