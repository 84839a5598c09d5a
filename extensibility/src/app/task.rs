//! Types and utilities for the App's tokio tasks.

use std::{fmt, pin::Pin, sync::Arc};

use futures::{Future, StreamExt};
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
        BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions,
    },
    types::{FieldTable, ShortString},
    BasicProperties, Channel, Connection, Consumer, ExchangeKind,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{ContentType, Error, Handler, ListenerConfig, Request, Respond, Result};

/// The default exchange is indicated by the empty string in AMQP. Replies are published there.
const DEFAULT_EXCHANGE: &str = "";

/// Consumer tasks are the async functions that are run in the tokio tasks to run handlers.
///
/// They use a given consumer and channel handle in order to receive AMQP deliveries.
/// The deliveries are then used to extract the required information according to the extractors of the handler.
///
/// Consumer tasks keep processing messages until shutdown is signalled, in which case they return `Ok(())`.
/// Should the broker cancel the consumer, they return [`Error::ConsumerCancelled`].
pub(super) type HandlerTask = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Creates the consumer task for the given handler and routing key. See [`HandlerTask`].
fn consumer_task<H, Args, Res, S>(
    routing_key: String,
    handler: H,
    channel: Channel,
    mut consumer: Consumer,
    state: Arc<S>,
    content_type: ContentType,
    mut shutdown: broadcast::Receiver<()>,
) -> HandlerTask
where
    H: Handler<Args, Res, S>,
    Args: Send + 'static,
    Res: Respond + fmt::Debug + Send + 'static,
    S: Send + Sync + 'static,
{
    Box::pin(async move {
        loop {
            let delivery = tokio::select! {
                _ = shutdown.recv() => None,
                delivery = consumer.next() => match delivery {
                    Some(delivery) => Some(delivery),
                    // We should only ever get to this point if the consumer is cancelled.
                    None => return Err(Error::ConsumerCancelled(routing_key)),
                },
            };

            let Some(delivery) = delivery else {
                debug!("Cancelling consumer {:?} on routing key {routing_key:?}", consumer.tag());
                if let Err(e) = channel
                    .basic_cancel(consumer.tag().as_str(), BasicCancelOptions::default())
                    .await
                {
                    warn!("Failed to cancel consumer on routing key {routing_key:?}: {e:#}");
                }
                return Ok(());
            };

            let req = match delivery {
                Err(e) => {
                    error!("Error when receiving delivery on routing key {routing_key:?}: {e:#}");
                    continue;
                }
                Ok(delivery) => Request::new(delivery, state.clone(), content_type),
            };

            let span = info_span!("request", req_id = %req.req_id(), routing_key = %routing_key);
            let acker = req.delivery.acker.clone();
            // Each consumer handles one request at a time.
            let handling = handle_request(req, handler.clone(), channel.clone());
            run_isolated(handling, acker, &routing_key)
                .instrument(span)
                .await;
        }
    })
}

/// Runs the handling of one request in its own task, so that a panicking handler only loses that request.
///
/// The delivery of a request whose handling panicked is rejected without requeueing, otherwise it would
/// keep holding a prefetch slot of the consumer. Returns whether the handling completed.
async fn run_isolated<F>(handling: F, acker: Acker, routing_key: &str) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    let Err(e) = tokio::spawn(handling.in_current_span()).await else {
        return true;
    };

    error!("Request handler for {routing_key:?} panicked: {e:#}");
    let options = BasicNackOptions {
        requeue: false,
        ..Default::default()
    };
    match acker.nack(options).await {
        Ok(()) => warn!("Rejected request whose handler panicked."),
        Err(e) => error!("Failed to reject request whose handler panicked: {e:#}"),
    }

    false
}

/// Handles the given request with the given handler and channel.
///
/// Replies if the handler produced a response and the request has a `reply_to`, then acks the request.
async fn handle_request<H, Args, Res, S>(mut req: Request<S>, handler: H, channel: Channel)
where
    H: Handler<Args, Res, S>,
    Args: Send + 'static,
    Res: Respond + fmt::Debug + Send + 'static,
    S: Send + Sync + 'static,
{
    let reply_to = req.reply_to().cloned();
    let correlation_id = req.correlation_id().cloned();
    let content_type = req.content_type();

    // Call the handler with the request.
    let response = handler.call(&mut req).await;
    debug!(
        "Handler {:?} produced response: {response:?}",
        std::any::type_name::<H>()
    );

    match response.respond(content_type) {
        Ok(Some(bytes_response)) => {
            if let Some(reply_to) = reply_to {
                publish_reply::<H>(&channel, reply_to, correlation_id, content_type, &bytes_response)
                    .await;
            } else {
                warn!("Received message for handler {:?} but the request did not contain a `reply_to` property, so no reply could be published.", std::any::type_name::<H>());
            }
        }
        Ok(None) => debug!("Handler did not produce a reply."),
        Err(e) => error!("Failed to encode reply: {e:#}"),
    }

    match req.delivery.acker.ack(BasicAckOptions::default()).await {
        Ok(()) => debug!("Successfully acked request."),
        Err(e) => error!("Failed to ack request: {e:#}"),
    }
}

/// Publishes a reply on the default exchange, routed to the `reply_to` of the request.
async fn publish_reply<H>(
    channel: &Channel,
    reply_to: ShortString,
    correlation_id: Option<ShortString>,
    content_type: ContentType,
    payload: &[u8],
) {
    let mut props = BasicProperties::default().with_content_type(content_type.mime().into());

    if let Some(correlation_id) = correlation_id {
        props = props.with_correlation_id(correlation_id);
    } else {
        warn!("Request for handler {:?} did not contain a `correlation_id` property. A reply will be published, but the receiver may not recognize it as the reply for their request.", std::any::type_name::<H>());
    }

    let publish = channel
        .basic_publish(
            DEFAULT_EXCHANGE,
            reply_to.as_str(),
            BasicPublishOptions::default(),
            payload,
            props,
        )
        .await;

    match publish {
        Ok(_confirm) => {
            debug!("Successfully published reply to routing key {reply_to:?}");
        }
        // We tried to reply but somehow our response never got published.
        // We'll log an error in this case. Panicking probably doesn't help much.
        Err(e) => {
            error!("Error when publishing reply to routing key {reply_to:?}: {e:#}");
        }
    }
}

/// The factory function stored in a [`TaskFactory`].
type Factory<S> = Box<
    dyn FnOnce(Vec<(Channel, Consumer)>, Arc<S>, &broadcast::Sender<()>) -> Vec<HandlerTask>
        + Send,
>;

/// Task factories take channels, consumers and the app state and produce tasks for running in tokio.
///
/// This type is saved by [`App`] during calls to [`App::listener`][crate::App::listener].
/// It is how the [`App`] keeps the handlers saved before running.
///
/// Upon calling [`App::run`][crate::App::run], channels and consumers are created for each task factory,
/// creating one [`HandlerTask`] per consumer which can then be run in tokio.
///
/// [`App`]: crate::App
pub(super) struct TaskFactory<S> {
    /// The routing key of the handler tasks produced by this task factory.
    routing_key: String,
    /// Listener configuration for the handler tasks produced by this task factory.
    config: ListenerConfig,
    /// The factory function that constructs the handler tasks.
    factory: Factory<S>,
}

impl<S> TaskFactory<S> {
    /// Constructs a new task factory from the given routing key and handler.
    pub(super) fn new<H, Args, Res>(routing_key: String, handler: H, config: ListenerConfig) -> Self
    where
        H: Handler<Args, Res, S>,
        Args: Send + 'static,
        Res: Respond + fmt::Debug + Send + 'static,
        S: Send + Sync + 'static,
    {
        let content_type = config.content_type;
        let task_routing_key = routing_key.clone();
        Self {
            routing_key,
            config,
            factory: Box::new(
                move |consumers: Vec<(Channel, Consumer)>,
                      state: Arc<S>,
                      shutdown: &broadcast::Sender<()>| {
                    consumers
                        .into_iter()
                        .map(|(channel, consumer)| {
                            consumer_task(
                                task_routing_key.clone(),
                                handler.clone(),
                                channel,
                                consumer,
                                state.clone(),
                                content_type,
                                shutdown.subscribe(),
                            )
                        })
                        .collect()
                },
            ),
        }
    }

    /// Retrieves the routing key for this task factory.
    pub(super) fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Declares the topology of the listener and builds one task per consumer.
    pub(super) async fn build(
        self,
        conn: &Connection,
        state: Arc<S>,
        shutdown: &broadcast::Sender<()>,
    ) -> lapin::Result<Vec<HandlerTask>> {
        let config = &self.config;

        let setup = conn.create_channel().await?;
        match &config.exchange_kind {
            Some(kind) => {
                let options = ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                };
                setup
                    .exchange_declare(&config.exchange, kind.clone(), options, FieldTable::default())
                    .await?;
            }
            // Passive declaration fails if the exchange is missing, the kind is ignored.
            None => {
                let options = ExchangeDeclareOptions {
                    passive: true,
                    ..Default::default()
                };
                setup
                    .exchange_declare(
                        &config.exchange,
                        ExchangeKind::Direct,
                        options,
                        FieldTable::default(),
                    )
                    .await?;
            }
        }

        setup
            .queue_declare(&config.queue, config.options, config.arguments.clone())
            .await?;
        setup
            .queue_bind(
                &config.queue,
                &config.exchange,
                &self.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        if let Err(e) = setup.close(200, "OK").await {
            warn!("Failed to close setup channel: {e:#}");
        }

        let mut consumers = Vec::with_capacity(config.concurrency.get().into());
        for index in 0..config.concurrency.get() {
            // A dedicated channel per consumer, so prefetch applies to each consumer separately.
            let channel = conn.create_channel().await?;
            channel
                .basic_qos(config.prefetch, BasicQosOptions::default())
                .await?;

            let consumer = channel
                .basic_consume(
                    &config.queue,
                    &format!("{}-{index}", config.queue),
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            consumers.push((channel, consumer));
        }

        info!(
            "Bound queue {:?} to exchange {:?} with routing key {:?} ({} consumers, {})",
            config.queue,
            config.exchange,
            self.routing_key,
            consumers.len(),
            config.content_type,
        );

        Ok((self.factory)(consumers, state, shutdown))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use lapin::acker::Acker;

    use super::run_isolated;

    #[tokio::test]
    async fn completed_handling_is_reported() {
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();
        let completed = run_isolated(
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Acker::default(),
            "routing-key",
        )
        .await;

        assert!(completed);
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_handling_is_contained() {
        let completed = run_isolated(
            async { panic!("handler failed") },
            Acker::default(),
            "routing-key",
        )
        .await;
        assert!(!completed);

        // The consumer carries on with its next request.
        assert!(run_isolated(async {}, Acker::default(), "routing-key").await);
    }
}
