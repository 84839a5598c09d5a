//! Holds [ListenerConfig]'s implementation.

use std::num::NonZeroU16;
use std::time::Duration;

use lapin::options::QueueDeclareOptions;
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::ExchangeKind;

use crate::ContentType;

/// Detailed configuration of an object extension listener.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// The exchange that the queue will be bound to.
    pub(crate) exchange: String,
    /// The queue consumed by the listener.
    pub(crate) queue: String,
    /// Wire format of requests and replies.
    pub(crate) content_type: ContentType,
    /// Number of consumers on the queue, each handling one message at a time.
    pub(crate) concurrency: NonZeroU16,
    /// Prefetch for each consumer.
    pub(crate) prefetch: u16,
    /// Queue declare options.
    pub(crate) options: QueueDeclareOptions,
    /// Queue arguments (aka. x-arguments).
    pub(crate) arguments: FieldTable,
    /// The kind to declare the exchange with. `None` only checks that the exchange exists.
    pub(crate) exchange_kind: Option<ExchangeKind>,
}

impl ListenerConfig {
    /// The default value for the prefetch count.
    pub const DEFAULT_PREFETCH: u16 = 64;

    /// Creates a configuration consuming `queue`, bound to `exchange`.
    ///
    /// Defaults to JSON messages, a single consumer and an auto-deleted, non-durable queue.
    /// The exchange is expected to exist already, see [`Self::with_declared_exchange`].
    pub fn new(exchange: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            content_type: ContentType::Json,
            concurrency: NonZeroU16::MIN,
            prefetch: Self::DEFAULT_PREFETCH,
            options: QueueDeclareOptions {
                auto_delete: true,
                ..Default::default()
            },
            arguments: Default::default(),
            exchange_kind: None,
        }
    }

    /// Sets the wire format of requests and replies.
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Sets how many consumers handle messages from the queue in parallel.
    pub fn with_concurrency(mut self, concurrency: NonZeroU16) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Per consumer prefetch count. See [documentation](https://www.rabbitmq.com/confirms.html#channel-qos-prefetch).
    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Declares the exchange with the given kind (durable) instead of requiring it to exist.
    pub fn with_declared_exchange(mut self, kind: ExchangeKind) -> Self {
        self.exchange_kind = Some(kind);
        self
    }

    /// Overwrite the `auto-delete` property for the queue (defaults to `true`).
    /// See also [documentation](https://www.rabbitmq.com/queues.html#properties).
    pub fn with_auto_delete(mut self, auto_delete: bool) -> Self {
        self.options.auto_delete = auto_delete;
        self
    }

    /// Set the `durable` property of the queue (defaults to `false`).
    /// See also the [documentation](https://www.rabbitmq.com/queues.html#properties).
    pub fn with_durable(mut self, durable: bool) -> Self {
        self.options.durable = durable;
        self
    }

    /// Messages expires if not consumed within `message_ttl`.
    /// See [documentation](https://www.rabbitmq.com/ttl.html#message-ttl-using-x-args).
    // Panic is extremely unlikely, let's not bother.
    #[allow(clippy::missing_panics_doc)]
    pub fn with_message_ttl(mut self, message_ttl: Duration) -> Self {
        let millis: u32 = message_ttl
            .as_millis()
            .try_into()
            .expect("Duration too long to fit milliseconds in 32 bits");

        self.arguments.insert("x-message-ttl".into(), millis.into());
        self
    }

    /// Set any argument with any value.
    ///
    /// Prefer the more specific methods if you can, but you can use this for any specific argument you might want to set.
    pub fn with_arg(mut self, arg: impl Into<ShortString>, value: impl Into<AMQPValue>) -> Self {
        self.arguments.insert(arg.into(), value.into());
        self
    }

    /// The exchange the queue is bound to.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// The consumed queue.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Wire format of requests and replies.
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Number of consumers on the queue.
    pub fn concurrency(&self) -> NonZeroU16 {
        self.concurrency
    }
}
