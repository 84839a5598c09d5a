//! AMQP requests.

use std::sync::Arc;

use lapin::{message::Delivery, protocol::basic::AMQPProperties, types::ShortString};

use crate::{extract::ReqId, ContentType};

/// An AMQP request.
#[derive(Debug)]
pub struct Request<S> {
    /// The app state. This is added to the app at construction in [`crate::App::new`] and given to each request.
    state: Arc<S>,
    /// The content type the listener was registered with. Bodies are decoded in this format.
    content_type: ContentType,
    /// Request ID. This is a unique ID for every request. Either a newly created UUID or whatever
    /// is found in the `req_id` header of the incoming AMQP message.
    pub(crate) req_id: ReqId,
    /// The message delivery.
    pub(crate) delivery: Delivery,
}

impl<S> Request<S> {
    /// Constructs a new request from a [`Delivery`].
    pub fn new(delivery: Delivery, state: Arc<S>, content_type: ContentType) -> Self {
        Self {
            state,
            content_type,
            req_id: ReqId::from_delivery(&delivery),
            delivery,
        }
    }

    /// Returns the app state for the given type.
    pub fn state<T>(&self) -> T
    where
        T: for<'a> From<&'a S>,
    {
        self.state.as_ref().into()
    }

    /// Returns the content type of the listener that received this request.
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Returns the id of this request.
    pub fn req_id(&self) -> &ReqId {
        &self.req_id
    }

    /// Returns the underlying delivery.
    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Returns the AMQP properties of the request.
    pub fn properties(&self) -> &AMQPProperties {
        &self.delivery.properties
    }

    /// Returns the `type` AMQP property of the request, which names the kind of message in the body.
    pub fn message_type(&self) -> Option<&str> {
        self.properties().kind().as_ref().map(ShortString::as_str)
    }

    /// Returns the `reply_to` AMQP property of the request.
    pub fn reply_to(&self) -> Option<&ShortString> {
        self.properties().reply_to().as_ref()
    }

    /// Returns the `correlation_id` AMQP property of the request.
    pub fn correlation_id(&self) -> Option<&ShortString> {
        self.properties().correlation_id().as_ref()
    }
}
