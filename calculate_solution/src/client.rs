//! The messaging client seen by the extension.

use std::{fmt, num::NonZeroU16};

use extensibility::{App, ContentType, Handler, ListenerConfig, Respond};

/// What the extension needs from a messaging client: broker credentials and a way to register a listener.
pub trait ExtensionClient: Sized {
    /// Sets the broker and the credentials to connect with.
    fn configure(self, host: &str, user: &str, password: &str) -> Self;

    /// Binds `queue` to `exchange` with `routing_key` and hands every message on it to `handler`,
    /// with `concurrency` messages handled in parallel.
    fn register_object_extension_listener<H, Args, Res>(
        self,
        exchange: &str,
        queue: &str,
        routing_key: &str,
        handler: H,
        content_type: ContentType,
        concurrency: NonZeroU16,
    ) -> Self
    where
        H: Handler<Args, Res, ()>,
        Args: Send + 'static,
        Res: Respond + fmt::Debug + Send + 'static;
}

impl ExtensionClient for App<()> {
    fn configure(self, host: &str, user: &str, password: &str) -> Self {
        App::configure(self, host, user, password)
    }

    fn register_object_extension_listener<H, Args, Res>(
        self,
        exchange: &str,
        queue: &str,
        routing_key: &str,
        handler: H,
        content_type: ContentType,
        concurrency: NonZeroU16,
    ) -> Self
    where
        H: Handler<Args, Res, ()>,
        Args: Send + 'static,
        Res: Respond + fmt::Debug + Send + 'static,
    {
        let config = ListenerConfig::new(exchange, queue)
            .with_content_type(content_type)
            .with_concurrency(concurrency);
        self.listener(routing_key, handler, config)
    }
}
