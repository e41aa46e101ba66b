//! Fetch sources for refresh and polling

use std::future::Future;

use async_trait::async_trait;

use crate::error::Result;

/// Asynchronous source of a fresh value
///
/// Any `Fn() -> impl Future<Output = Result<T>>` closure is a fetcher:
///
/// ```ignore
/// let options = SyncOptions::new(0).with_fetcher(|| async { Ok(42) });
/// ```
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    /// Fetch the current value from the source
    async fn fetch(&self) -> Result<T>;
}

#[async_trait]
impl<T, F, Fut> Fetcher<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
{
    async fn fetch(&self) -> Result<T> {
        (self)().await
    }
}
