//! Interface for types that can extract themselves from requests.

mod message;
mod req_id;
mod state;

use std::{convert::Infallible, error::Error};

use async_trait::async_trait;

use crate::Request;

pub use message::{Body, ExtensionMessage, Msg};
pub use req_id::ReqId;
pub use state::State;

/// A trait for types that can be extracted from [requests](`Request`).
#[async_trait]
pub trait Extract<S>: Sized {
    /// The error to return in case extraction fails.
    type Error: Error;

    /// Extract the type from the request.
    async fn extract(req: &mut Request<S>) -> Result<Self, Self::Error>;
}

/// Extracting options simply discards the error and returns None in that case.
#[async_trait]
impl<S, T> Extract<S> for Option<T>
where
    S: Send + Sync,
    T: Extract<S>,
{
    type Error = Infallible;

    async fn extract(req: &mut Request<S>) -> Result<Self, Self::Error> {
        Ok(Extract::extract(req).await.ok())
    }
}

#[async_trait]
impl<S, T> Extract<S> for Result<T, <T as Extract<S>>::Error>
where
    S: Send + Sync,
    T: Extract<S>,
{
    type Error = Infallible;

    async fn extract(req: &mut Request<S>) -> Result<Self, Self::Error> {
        Ok(Extract::extract(req).await)
    }
}
