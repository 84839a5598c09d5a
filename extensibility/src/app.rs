//! Module for the [App] struct and surrounding utilities.

mod task;

use std::{fmt, sync::Arc};

use futures::{future::try_join_all, stream::FuturesUnordered, StreamExt};
use lapin::{
    uri::{AMQPAuthority, AMQPUri, AMQPUserInfo},
    Connection, ConnectionProperties,
};
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, trace, warn};

use self::task::TaskFactory;
use crate::{Error, Handler, ListenerConfig, Respond, Result};

/// The central struct of your extension.
#[must_use = "The app will not do anything unless you call `.run`."]
pub struct App<S> {
    /// Task factories for every registered listener.
    /// Task factories are constructed in [`App::listener`] and called in [`App::run`].
    handlers: Vec<TaskFactory<S>>,
    /// This is used to hold the state values that users may want to store before running the app,
    /// and then extract in their handlers. Types that wish to be extracted via `State<T>` must
    /// implement `From<&S>`.
    state: S,
    /// The broker to connect to in [`App::run`], set by [`App::configure`].
    pub(crate) broker: Option<AMQPUri>,
    /// Shutdown channel. Used to indicate that we should start graceful shutdown.
    /// The channel has capacity 1 as we only need to signal once to shutdown.
    /// Missing messages on the channel doesn't matter.
    shutdown: broadcast::Sender<()>,
}

impl<S: Default> Default for App<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S> fmt::Debug for App<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("handlers", &self.handlers.len())
            .field(
                "broker",
                &self
                    .broker
                    .as_ref()
                    .map(|uri| (&uri.authority.host, uri.authority.port)),
            )
            .finish_non_exhaustive()
    }
}

impl<S> App<S> {
    /// The AMQP port used when the configured host doesn't name one.
    pub const DEFAULT_PORT: u16 = 5672;

    /// Creates a new app.
    pub fn new(state: S) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            handlers: Vec::new(),
            state,
            broker: None,
            shutdown,
        }
    }

    /// Sets the broker to connect to and the credentials to connect with.
    ///
    /// `host` may carry a port (`broker.example.com:5673`), otherwise [`Self::DEFAULT_PORT`] is used.
    /// The default virtual host `/` is used.
    pub fn configure(mut self, host: &str, user: &str, password: &str) -> Self {
        let (host, port) = match host.rsplit_once(':') {
            Some((name, port)) => match port.parse() {
                Ok(port) => (name, port),
                Err(_) => {
                    warn!("Ignoring invalid port {port:?} in broker host {host:?}");
                    (name, Self::DEFAULT_PORT)
                }
            },
            None => (host, Self::DEFAULT_PORT),
        };

        debug!("Configured AMQP broker {user}@{host}:{port}");
        self.broker = Some(AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: user.to_string(),
                    password: password.to_string(),
                },
                host: host.to_string(),
                port,
            },
            ..Default::default()
        });
        self
    }

    /// Returns a [`broadcast::Sender<()>`]. If you send a message on this channel, the app will gracefully shut down.
    pub fn shutdown_channel(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Sets up signal handling to gracefully shut down the app when
    /// this process receives termination signals from the operating system.
    ///
    /// This is a convenience function. If you want custom shutdown behavior, you can
    /// use the broadcast channel returned from the [`Self::shutdown_channel`] method.
    ///
    /// For non-Unix platforms, it uses [`tokio::signal::ctrl_c`].
    /// For Unix platforms, it sets up listeners for SIGTERM, SIGINT and SIGHUP.
    ///
    /// This must be called from within a tokio runtime.
    ///
    /// # Panics
    /// The background listening task spawned by this function will panic on Unix if it fails to setup any of the signal listeners.
    /// In this case, signals will not be listened to and graceful shutdown will not start if signals are sent to the process.
    pub fn graceful_shutdown_on_signal(self) -> Self {
        let shutdown = self.shutdown_channel();
        tokio::spawn(async move {
            #[cfg(not(unix))]
            {
                // This should cover ctrl-c in most platforms.
                let signal = tokio::signal::ctrl_c().await;

                if let Err(e) = signal {
                    error!("Failed to listen for ctrl-c: {e}")
                }

                info!("Received ctrl-c. Attempting to gracefully shut down...");
            }

            #[cfg(unix)]
            {
                // SIGTERM is commonly sent for graceful shutdown of applications, followed by 30 seconds of grace time, then a SIGKILL.
                let mut sigterm =
                    signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
                // SIGINT is usually sent due to ctrl-c in the terminal.
                let mut sigint =
                    signal(SignalKind::interrupt()).expect("failed to listen for SIGINT");
                // SIGHUP is usually sent when the terminal closes or the user logs out.
                let mut sighup = signal(SignalKind::hangup()).expect("failed to listen for SIGHUP");

                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM. Attempting to gracefully shut down..."),
                    _ = sigint.recv() => info!("Received SIGINT. Attempting to gracefully shut down..."),
                    _ = sighup.recv() => info!("Received SIGHUP. Attempting to gracefully shut down..."),
                };
            }

            if let Err(e) = shutdown.send(()) {
                error!("Failed to send shutdown message: {e}")
            }
        });

        self
    }

    /// Registers an object extension listener.
    ///
    /// A queue named in `config` is declared and bound with `routing_key` to the exchange named in `config`.
    /// Every message on the queue is handed to `handler`. Whatever the handler returns is encoded in the
    /// configured content type and published to the `reply_to` of the message, unless the handler declines to reply.
    pub fn listener<H, Args, Res>(
        mut self,
        routing_key: impl Into<String>,
        handler: H,
        config: ListenerConfig,
    ) -> Self
    where
        H: Handler<Args, Res, S>,
        Args: Send + 'static,
        Res: Respond + fmt::Debug + Send + 'static,
        S: Send + Sync + 'static,
    {
        let routing_key = routing_key.into();
        debug!(
            "Registering handler {} on routing key {routing_key:?} with config {config:?}",
            std::any::type_name::<H>()
        );

        // Create and save the task factory - this is a function that creates the async tasks that will be run in tokio.
        self.handlers
            .push(TaskFactory::new(routing_key, handler, config));

        self
    }

    /// Connects to the broker given in [`configure`][App::configure] and calls
    /// [`run_with_connection`][App::run_with_connection] with the resulting connection.
    ///
    /// # Errors
    /// Returns `Err` if no listeners were registered, if the app was not configured, or
    /// for any of the errors of [`run_with_connection`][App::run_with_connection].
    pub async fn run(self) -> Result<()> {
        if self.handlers.is_empty() {
            return Err(Error::NoHandlers);
        }
        let Some(broker) = self.broker.clone() else {
            return Err(Error::NotConfigured);
        };

        let (host, port) = (&broker.authority.host, broker.authority.port);
        debug!("Connecting to AMQP on {host}:{port} ...");
        let conn = Connection::connect_uri(broker.clone(), ConnectionProperties::default())
            .await
            .map_err(Error::Lapin)?;
        trace!("Connected to AMQP on {host}:{port}");
        self.run_with_connection(&conn).await
    }

    /// Runs the app with all the listeners that have been registered.
    ///
    /// Each consumer of a listener is given its own dedicated channel associated with the given connection
    /// and runs in its own spawned tokio task.
    ///
    /// # Errors
    /// Returns an `Err` on any of the below conditions:
    /// * No listeners were registered.
    /// * Exchange checks, queue/consumer declaration or binding failed while setting up a listener.
    /// * The broker cancelled a consumer.
    ///
    /// # Panics
    /// Panics if one of the framework's own consumer tasks panics.
    pub async fn run_with_connection(self, conn: &Connection) -> Result<()> {
        let shutdown_channel = self.shutdown_channel();
        let mut handles = self.setup_handlers(conn).await?;

        let mut ret = Ok(());
        while let Some(returning_handler) = handles.next().await {
            match returning_handler {
                Ok(Ok(())) => {
                    // Graceful consumer shutdown, do nothing.
                    // If all goes well, all consumers will go into this branch
                    // and eventually we'll be done.
                }
                Ok(Err(e)) => {
                    // Consumer cancellation from AMQP broker.
                    if let Err(e) = shutdown_channel.send(()) {
                        error!("Failed to send shutdown signal to other tasks on consumer cancellation: {e}");
                    }
                    ret = Err(e);
                }
                Err(e) => {
                    // Panic from our own consumer task handling.
                    // Panics in handlers don't cause an exit from the app.
                    panic!("A consumer task panicked: {e:#}");
                }
            }
        }

        info!("Gracefully shutdown. Goodbye.");

        ret
    }

    /// Set up all the listeners, returning a collection of all the join handles.
    pub(crate) async fn setup_handlers(
        self,
        conn: &Connection,
    ) -> Result<FuturesUnordered<JoinHandle<Result<()>>>> {
        if self.handlers.is_empty() {
            return Err(Error::NoHandlers);
        }

        let conn_err_shutdown = self.shutdown.clone();
        // If the connection fails, we try to signal for a graceful shutdown.
        conn.on_error(move |e| {
            error!("Connection returned error: {e:#}");
            if let Err(e) = conn_err_shutdown.send(()) {
                warn!("Could not send shutdown signal; are all handlers shut down already? Error: {e:#}");
            }
        });

        let state = Arc::new(self.state);
        let shutdown = &self.shutdown;
        let tasks = try_join_all(self.handlers.into_iter().map(|task_factory| {
            let state = state.clone();
            async move {
                debug!(
                    "Spawning consumer tasks for routing key: {:?} ...",
                    task_factory.routing_key()
                );

                // Construct the tasks from the factory. This produces pinned futures which we can then spawn.
                task_factory
                    .build(conn, state, shutdown)
                    .await
                    .map_err(Error::Lapin)
            }
        }))
        .await?;

        let listeners = tasks.len();
        let join_handles: FuturesUnordered<_> = tasks
            .into_iter()
            .flatten()
            .map(tokio::spawn)
            .collect();

        info!(
            "Connected to AMQP broker. Listening on {listeners} listener{} with {} consumer{}.",
            if listeners == 1 { "" } else { "s" },
            join_handles.len(),
            if join_handles.len() == 1 { "" } else { "s" }
        );

        Ok(join_handles)
    }
}
