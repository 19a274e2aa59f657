//! Tag-filtered views over a shared hook.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::hooks::hook::{Handler, HandlerFunc, Hook, Next, handler_fn};

/// Event payloads that declare tags for selective dispatch.
///
/// An empty tag list means the event is unconstrained.
pub trait Tagged {
    fn tags(&self) -> &[String];
}

/// A filtering view over a shared main [`Hook`].
///
/// Handlers bound through the view are registered on the main hook wrapped
/// in a tag check: when the triggering event's tags do not satisfy
/// [`TaggedHook::can_trigger_on`], the wrapper transparently advances the
/// chain, so filtered-out handlers are invisible to ordering and error
/// propagation. The view owns no handler storage; several views over one
/// hook interleave strictly by the main hook's ordering.
pub struct TaggedHook<'h, E> {
    hook: &'h Hook<E>,
    tags: Vec<String>,
}

impl<'h, E: Tagged + Send + 'static> TaggedHook<'h, E> {
    /// Create a view over `hook` filtering on `tags`. No tags = match all.
    pub fn new<I, S>(hook: &'h Hook<E>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hook,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// The shared main hook this view registers on.
    pub fn hook(&self) -> &Hook<E> {
        self.hook
    }

    /// Whether an event carrying `tags` would fire this view's handlers.
    pub fn can_trigger_on(&self, tags: &[String]) -> bool {
        tags_overlap(&self.tags, tags)
    }

    /// Insert or replace a handler on the main hook, wrapped in the tag
    /// filter. Returns the handler id.
    pub async fn bind(&self, handler: Handler<E>) -> String {
        let (id, priority, func) = handler.into_parts();
        let wrapped = self.wrap(func);
        let mut handler = Handler::from_func(wrapped).with_priority(priority);
        if !id.is_empty() {
            handler = handler.with_id(id);
        }
        self.hook.bind(handler).await
    }

    /// Bind a plain function with priority 0 and a generated id, wrapped in
    /// the tag filter.
    pub async fn bind_func<F>(&self, func: F) -> String
    where
        F: for<'e> Fn(&'e mut E, Next<E>) -> BoxFuture<'e, Result<()>> + Send + Sync + 'static,
    {
        self.hook.bind(Handler::from_func(self.wrap(Arc::new(func)))).await
    }

    fn wrap(&self, func: HandlerFunc<E>) -> HandlerFunc<E> {
        let tags = self.tags.clone();
        handler_fn(move |event: &mut E, next| {
            if tags_overlap(&tags, event.tags()) {
                func(event, next)
            } else {
                next.run(event)
            }
        })
    }
}

fn tags_overlap(configured: &[String], event_tags: &[String]) -> bool {
    if configured.is_empty() {
        return true; // match all
    }
    event_tags.iter().any(|t| configured.contains(t))
}
