//! AMQP responses.

use serde::Serialize;

use crate::{
    content_type::EncodeError,
    extract::{Body, Msg},
    ContentType,
};

/// A trait for types that may produce responses.
///
/// This really just means they can be converted into a byte-stream in the listener's content type,
/// or that they decline to reply at all.
pub trait Respond {
    /// Creates the bytes payload of this value, or `None` if nothing should be published.
    ///
    /// # Errors
    /// Returns `Err` if the value could not be encoded in the given content type.
    fn respond(self, content_type: ContentType) -> Result<Option<Vec<u8>>, EncodeError>;
}

/// Handlers returning `()` never reply.
impl Respond for () {
    fn respond(self, _content_type: ContentType) -> Result<Option<Vec<u8>>, EncodeError> {
        Ok(None)
    }
}

impl<R: Respond> Respond for Option<R> {
    fn respond(self, content_type: ContentType) -> Result<Option<Vec<u8>>, EncodeError> {
        match self {
            Some(response) => response.respond(content_type),
            None => Ok(None),
        }
    }
}

/// Serializable messages are encoded in the content type of the listener.
impl<T: Serialize> Respond for Msg<T> {
    fn respond(self, content_type: ContentType) -> Result<Option<Vec<u8>>, EncodeError> {
        content_type.encode(&self.0).map(Some)
    }
}

/// Bodies reply with the bytes they were delivered with, whatever the content type.
impl<T> Respond for Body<T> {
    fn respond(self, _content_type: ContentType) -> Result<Option<Vec<u8>>, EncodeError> {
        Ok(Some(self.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_messages_produce_bytes() {
        assert_eq!(().respond(ContentType::Json).unwrap(), None);
        assert_eq!(None::<Msg<u32>>.respond(ContentType::Json).unwrap(), None);
        assert_eq!(
            Some(Msg(vec![1, 2])).respond(ContentType::Json).unwrap(),
            Some(b"[1,2]".to_vec())
        );
    }

    #[test]
    fn bodies_reply_with_delivered_bytes() {
        let delivered = br#"{ "a": [1, 2],  "b": null }"#;
        let body: Body<serde_json::Value> = Body::decode(ContentType::Json, &delivered[..]).unwrap();
        assert_eq!(body["a"][1], 2);
        assert_eq!(
            body.respond(ContentType::Json).unwrap(),
            Some(delivered.to_vec())
        );
    }
}
