// Item handler (caller-supplied processing function)

use crate::domain::Outcome;
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;

/// Processes one decoded queue item
///
/// Returning `Err` is treated as an unclassified failure: the item is
/// logged and dropped. Handlers must tolerate duplicate delivery.
#[async_trait]
pub trait ItemHandler<T: Send + 'static>: Send + Sync {
    async fn handle(&self, item: T) -> Result<Outcome>;
}

/// Adapter turning an async closure into an `ItemHandler`
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as an item handler
///
/// ```ignore
/// let handler = handler_fn(|item: CoverageItem| async move {
///     upload(&item).await;
///     Ok(Outcome::Success)
/// });
/// ```
pub fn handler_fn<T, F, Fut>(f: F) -> FnHandler<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<T, F, Fut> ItemHandler<T> for FnHandler<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome>> + Send + 'static,
{
    async fn handle(&self, item: T) -> Result<Outcome> {
        (self.f)(item).await
    }
}
