//! Hello world object extension for the calculate solution phase.
//!
//! Receives placement proposals and replies with the same, unmodified proposal.

use std::{ffi::OsString, sync::Arc};

use extensibility::{
    platform::{ExtensionErrorMessage, SolutionProposal},
    Body, ExtensionMessage,
};
use tracing::{error, info, Span};

use crate::{cli::StartupParams, client::ExtensionClient};

/// Must match the exchange used when the extension was registered with the platform.
pub const EXCHANGE: &str = "reference-service-exchange";
/// The queue this extension consumes.
pub const QUEUE: &str = "reference-service-blocking-solution-queue";
/// The calculate solution extension point.
pub const ROUTING_KEY: &str = "urn:extensionPoint:vm:calculateSolution";

/// The listener registered on the calculate solution extension point.
#[derive(Debug)]
pub struct CalculateSolutionExtension {
    /// Everything the extension logs is recorded in this span.
    span: Span,
}

impl CalculateSolutionExtension {
    /// Creates the extension, logging in `span`.
    pub fn new(span: Span) -> Arc<Self> {
        Arc::new(Self { span })
    }

    /// Parses the startup parameters and registers the listener on `client`.
    ///
    /// Nothing is registered if the parameters are invalid.
    ///
    /// # Errors
    /// Returns the parse error of the startup parameters.
    pub fn start<C, I, T>(self: &Arc<Self>, args: I, client: C) -> Result<C, clap::Error>
    where
        C: ExtensionClient,
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let params = StartupParams::parse_args(args)?;
        Ok(self.register_listener(client, &params))
    }

    /// Registers a listener using the supplied broker credentials.
    /// Exchange, queue and routing key are fixed.
    pub fn register_listener<C: ExtensionClient>(
        self: &Arc<Self>,
        client: C,
        params: &StartupParams,
    ) -> C {
        let _entered = self.span.enter();
        info!(
            "Application started for RMQ: {}@{}. concurrent consumer count: {}",
            params.rmq_user, params.rmq_host, params.concurrent_consumers
        );

        let listener = Arc::clone(self);
        client
            .configure(&params.rmq_host, &params.rmq_user, &params.rmq_password)
            .register_object_extension_listener(
                EXCHANGE,
                QUEUE,
                ROUTING_KEY,
                move |message: ExtensionMessage<SolutionProposal>| {
                    let listener = listener.clone();
                    async move { listener.handle_solutions_message(message) }
                },
                params.content_type,
                params.concurrent_consumers,
            )
    }

    /// Called for every message on the queue. Proposals are echoed, error messages are not replied to.
    pub fn handle_solutions_message(
        &self,
        message: ExtensionMessage<SolutionProposal>,
    ) -> Option<Body<SolutionProposal>> {
        match message {
            ExtensionMessage::Payload(proposal) => Some(self.handle_solution(proposal)),
            ExtensionMessage::Error(error) => {
                self.handle_error(&error);
                None
            }
        }
    }

    /// Replies to a proposal with the proposal itself, byte for byte.
    pub fn handle_solution(&self, proposal: Body<SolutionProposal>) -> Body<SolutionProposal> {
        let _entered = self.span.enter();
        info!(
            "Received calculate solution message. Proposed hub: {}",
            proposal.proposed_hub().unwrap_or("<none>")
        );
        info!("Replying with same unmodified solution message");

        proposal
    }

    /// Error messages are only logged.
    pub fn handle_error(&self, error: &ExtensionErrorMessage) {
        let _entered = self.span.enter();
        error!("Received extension error message: {}", error.message);
    }
}
