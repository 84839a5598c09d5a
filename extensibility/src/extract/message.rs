//! Allows extracting decoded message bodies.

use async_trait::async_trait;
use derive_more::{Deref, DerefMut};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    content_type::DecodeError, error::HandlerError, platform::ExtensionErrorMessage, ContentType,
    Extract, Request,
};

/// A simple wrapper that allows you to extract a message body, decoded in the listener's content type.
///
/// Returning a `Msg` from a handler encodes it the same way.
#[derive(Debug, Clone, PartialEq, Eq, Deref, DerefMut)]
pub struct Msg<T>(pub T);

/// Extract implementation for message bodies.
#[async_trait]
impl<S, T> Extract<S> for Msg<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Error = HandlerError;

    async fn extract(req: &mut Request<S>) -> Result<Self, Self::Error> {
        Ok(Msg(req.content_type().decode(&req.delivery().data)?))
    }
}

/// A message body kept byte for byte as it was delivered, together with a decoded view of it.
///
/// The view only needs the fields the handler reads. Returning a `Body` from a handler replies
/// with the original bytes, so fields, attributes and namespaces the view doesn't know are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body<T> {
    /// The decoded view.
    view: T,
    /// The body as delivered.
    bytes: Vec<u8>,
}

impl<T: DeserializeOwned> Body<T> {
    /// Decodes the view of `bytes` and keeps the bytes.
    ///
    /// # Errors
    /// Returns `Err` if `bytes` are not a valid encoding of `T` in `content_type`.
    pub fn decode(content_type: ContentType, bytes: impl Into<Vec<u8>>) -> Result<Self, DecodeError> {
        let bytes = bytes.into();
        Ok(Self {
            view: content_type.decode(&bytes)?,
            bytes,
        })
    }
}

impl<T> Body<T> {
    /// The body exactly as it was delivered.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Discards the view, returning the body as it was delivered.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl<T> std::ops::Deref for Body<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.view
    }
}

#[async_trait]
impl<S, T> Extract<S> for Body<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Error = HandlerError;

    async fn extract(req: &mut Request<S>) -> Result<Self, Self::Error> {
        Ok(Body::decode(req.content_type(), req.delivery().data.as_slice())?)
    }
}

/// Everything the platform may send to an extension point: either the payload of the extension
/// point, or an error message about an earlier exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionMessage<T> {
    /// The message the extension point is about.
    Payload(Body<T>),
    /// The platform reports an error.
    Error(ExtensionErrorMessage),
}

/// The `type` property decides which variant is decoded. Without one, the body is decoded as the
/// payload first and as an error message second.
#[async_trait]
impl<S, T> Extract<S> for ExtensionMessage<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    // `Self::Error` would be ambiguous with the `Error` variant.
    type Error = HandlerError;

    async fn extract(req: &mut Request<S>) -> Result<Self, HandlerError> {
        let content_type = req.content_type();
        let data = req.delivery().data.as_slice();

        match req.message_type() {
            Some(ExtensionErrorMessage::MESSAGE_TYPE) => {
                Ok(Self::Error(content_type.decode(data)?))
            }
            Some(_) => Ok(Self::Payload(Body::decode(content_type, data)?)),
            None => match Body::decode(content_type, data) {
                Ok(payload) => Ok(Self::Payload(payload)),
                Err(payload_error) => {
                    debug!("Message is not a payload ({payload_error}), trying error message");
                    content_type
                        .decode(data)
                        .map(Self::Error)
                        .map_err(|_| payload_error.into())
                }
            },
        }
    }
}
