//! The seam to the HTTP layer.

use async_trait::async_trait;
use courier_error::CourierResult;
use std::sync::Arc;

/// Sends one request to the remote service.
///
/// Implementations report structured remote failures as
/// [`ApiError`](courier_error::ApiError) (see
/// [`ApiError::from_response`](courier_error::ApiError::from_response)) and
/// failures without a response as [`TransportError`](courier_error::TransportError),
/// so the dispatcher can tell which ones are worth retrying.
///
/// The dispatcher may drop an in-flight `send` when its caller cancels.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Outbound payload
    type Request: Send + Sync;
    /// Decoded response
    type Response: Send;

    /// Perform a single attempt.
    async fn send(&self, request: &Self::Request) -> CourierResult<Self::Response>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    type Request = T::Request;
    type Response = T::Response;

    async fn send(&self, request: &Self::Request) -> CourierResult<Self::Response> {
        (**self).send(request).await
    }
}
