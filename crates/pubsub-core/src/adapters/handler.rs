//! Closure-backed handlers.

use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;

use crate::domain::{DeliveryMetadata, HandlerError};
use crate::ports::MessageHandler;

/// `MessageHandler` wrapping an async closure.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Bytes, DeliveryMetadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, payload: Bytes, metadata: DeliveryMetadata) -> Result<(), HandlerError> {
        (self.f)(payload, metadata).await
    }
}

/// Build a shareable handler from an async closure.
///
/// ```rust,ignore
/// let handler = handler_fn(|payload, meta| async move {
///     println!("{} -> {:?}", meta.sequence(), payload);
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Bytes, DeliveryMetadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler::new(f))
}
