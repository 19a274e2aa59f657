//! Core hook engine: an ordered, mutable registry of handlers dispatched as
//! a chain of responsibility.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::error::Result;

/// A boxed, shareable handler function.
///
/// Handlers receive the event and the [`Next`] continuation by value. A
/// handler that drops the continuation without running it stops the chain;
/// no later link (registered or one-off) executes.
pub type HandlerFunc<E> =
    Arc<dyn for<'e> Fn(&'e mut E, Next<E>) -> BoxFuture<'e, Result<()>> + Send + Sync>;

/// Wrap a closure into a [`HandlerFunc`].
///
/// The closure returns a boxed future borrowing the event:
///
/// ```ignore
/// let f = handler_fn(|event, next| Box::pin(async move { next.run(event).await }));
/// ```
pub fn handler_fn<E, F>(f: F) -> HandlerFunc<E>
where
    F: for<'e> Fn(&'e mut E, Next<E>) -> BoxFuture<'e, Result<()>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A handler registration: identifier, priority and function.
///
/// An empty id is replaced with a generated unique token at bind time.
/// Binding a handler whose id already exists replaces that handler's
/// function and priority in place instead of appending a duplicate.
pub struct Handler<E> {
    id: String,
    priority: i32,
    func: HandlerFunc<E>,
}

impl<E> Handler<E> {
    /// Create a handler with priority 0 and a generated id.
    pub fn new<F>(func: F) -> Self
    where
        F: for<'e> Fn(&'e mut E, Next<E>) -> BoxFuture<'e, Result<()>> + Send + Sync + 'static,
    {
        Self {
            id: String::new(),
            priority: 0,
            func: Arc::new(func),
        }
    }

    /// Create a handler from an already-wrapped [`HandlerFunc`].
    pub fn from_func(func: HandlerFunc<E>) -> Self {
        Self {
            id: String::new(),
            priority: 0,
            func,
        }
    }

    /// Set an explicit id (binding replaces any existing handler with it).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the priority. Lower values run earlier; equal values preserve
    /// relative bind order.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub(crate) fn into_parts(self) -> (String, i32, HandlerFunc<E>) {
        (self.id, self.priority, self.func)
    }
}

/// The continuation for the current trigger: a cursor over the remaining
/// links of the chain.
///
/// Passed by value to each handler. Running it advances to the next link
/// and returns that link's result; an exhausted continuation is a no-op
/// returning `Ok(())`.
pub struct Next<E> {
    chain: VecDeque<HandlerFunc<E>>,
}

impl<E: Send> Next<E> {
    /// Invoke the next link in the chain, if any.
    pub fn run(mut self, event: &mut E) -> BoxFuture<'_, Result<()>> {
        match self.chain.pop_front() {
            Some(func) => func(event, self),
            None => Box::pin(async { Ok(()) }),
        }
    }
}

/// A registered handler with its stable insertion sequence number.
struct Entry<E> {
    id: String,
    priority: i32,
    seq: u64,
    func: HandlerFunc<E>,
}

/// An ordered registry of handlers for one event type, dispatched as a
/// chain of responsibility.
///
/// Handlers are kept sorted by `(priority, insertion order)`; lower
/// priority runs first. Replacing a handler by id keeps its original
/// insertion slot in the tie-break, even when the priority changes.
///
/// Registration and triggering take snapshots under a read/write lock, so
/// binding during an in-flight trigger only affects later triggers.
pub struct Hook<E> {
    handlers: RwLock<Vec<Entry<E>>>,
    next_seq: std::sync::atomic::AtomicU64,
}

impl<E: Send + 'static> Hook<E> {
    /// Create an empty hook.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_seq: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Insert or replace a handler, returning its id.
    pub async fn bind(&self, handler: Handler<E>) -> String {
        let (id, priority, func) = handler.into_parts();
        let id = if id.is_empty() {
            uuid::Uuid::new_v4().simple().to_string()
        } else {
            id
        };

        let mut handlers = self.handlers.write().await;
        if let Some(existing) = handlers.iter_mut().find(|e| e.id == id) {
            // Replace in place; the original insertion seq keeps the
            // tie-break stable unless the priority changed.
            existing.priority = priority;
            existing.func = func;
        } else {
            let seq = self
                .next_seq
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            handlers.push(Entry {
                id: id.clone(),
                priority,
                seq,
                func,
            });
        }
        handlers.sort_by_key(|e| (e.priority, e.seq));
        id
    }

    /// Bind a plain function with priority 0 and a generated id.
    pub async fn bind_func<F>(&self, func: F) -> String
    where
        F: for<'e> Fn(&'e mut E, Next<E>) -> BoxFuture<'e, Result<()>> + Send + Sync + 'static,
    {
        self.bind(Handler::new(func)).await
    }

    /// Remove the handlers with the given ids. Unknown ids are ignored.
    pub async fn unbind(&self, ids: &[&str]) {
        let mut handlers = self.handlers.write().await;
        handlers.retain(|e| !ids.contains(&e.id.as_str()));
    }

    /// Remove all handlers.
    pub async fn unbind_all(&self) {
        self.handlers.write().await.clear();
    }

    /// Current number of registered handlers.
    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }

    /// Dispatch the chain of registered handlers over `event`.
    ///
    /// Equivalent to [`Hook::trigger_with`] with no one-off functions.
    pub async fn trigger(&self, event: &mut E) -> Result<()> {
        self.trigger_with(event, std::iter::empty()).await
    }

    /// Dispatch the chain: sorted registered handlers followed by `extras`
    /// in the order given.
    ///
    /// Each link decides whether to advance by running its continuation.
    /// A link that advances and then returns an error does not undo the
    /// links that already ran; the error propagates back through the call
    /// stack and is returned here. Triggering with an empty chain returns
    /// `Ok(())`.
    pub async fn trigger_with(
        &self,
        event: &mut E,
        extras: impl IntoIterator<Item = HandlerFunc<E>>,
    ) -> Result<()> {
        // Snapshot the sorted handlers and drop the read guard before
        // dispatching; links may run arbitrarily long.
        let chain: VecDeque<HandlerFunc<E>> = {
            let handlers = self.handlers.read().await;
            handlers
                .iter()
                .map(|e| Arc::clone(&e.func))
                .chain(extras)
                .collect()
        };

        tracing::debug!(links = chain.len(), "dispatching hook chain");
        Next { chain }.run(event).await
    }
}

impl<E: Send + 'static> Default for Hook<E> {
    fn default() -> Self {
        Self::new()
    }
}
