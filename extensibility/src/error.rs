//! Extension-specific error types.

use std::convert::Infallible;

use thiserror::Error as ThisError;
use tracing::warn;

use crate::content_type::DecodeError;

/// Errors that may be returned by `extensibility`, especially when the app runs.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The app was started with no listeners registered.
    #[error("No listeners were registered on the app.")]
    NoHandlers,
    /// [`crate::App::run`] was called before the broker was configured.
    #[error("The app must be configured with a broker host and credentials before running.")]
    NotConfigured,
    /// The broker cancelled the consumers of a listener, e.g. because its queue was deleted.
    #[error("The consumer for routing key {0:?} was cancelled by the broker.")]
    ConsumerCancelled(String),
    /// An error from an underlying lapin call.
    #[error("An underlying `lapin` call failed: {0}")]
    Lapin(#[from] lapin::Error),
}

/// Errors that may be produced by handlers. Failing extractors provided by `extensibility` return this error.
#[derive(Debug, ThisError)]
pub enum HandlerError {
    /// Errors due to invalid requests.
    #[error("Invalid Request: {0:#}")]
    InvalidRequest(#[from] RequestError),
}

/// All the ways a request might be invalid.
#[derive(Debug, ThisError)]
pub enum RequestError {
    /// The message body could not be decoded into the required type.
    #[error("Message could not be decoded into the required type: {0:#}")]
    Decode(#[from] DecodeError),
}

impl From<DecodeError> for HandlerError {
    fn from(e: DecodeError) -> Self {
        RequestError::from(e).into()
    }
}

/// Types that may be constructed from errors.
///
/// You must implement `FromError<extensibility::HandlerError> for T` for any return type `T` of
/// your handlers that use fallible extractors. This is how the framework knows what to reply with
/// when extraction fails.
pub trait FromError<Err> {
    /// Converts the error into a response.
    fn from_error(error: Err) -> Self;
}

/// This impl ensures that extractors that use `Infallible` as their error type will automatically "just work".
impl<T> FromError<Infallible> for T {
    fn from_error(error: Infallible) -> Self {
        match error {}
    }
}

// Handlers returning `()` don't respond, so the error is only reported in the logs.
impl FromError<HandlerError> for () {
    fn from_error(error: HandlerError) -> Self {
        match error {
            HandlerError::InvalidRequest(e) => {
                warn!("Listener handler received an invalid request: {e:#}")
            }
        }
    }
}

// An optional response to a request that could not be extracted is no response at all.
impl<T> FromError<HandlerError> for Option<T> {
    fn from_error(error: HandlerError) -> Self {
        <() as FromError<HandlerError>>::from_error(error);
        None
    }
}
