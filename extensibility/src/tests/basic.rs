use std::sync::{Arc, Mutex};

use crate::{
    extract::{ReqId, State},
    platform::SolutionProposal,
    App, Body, Error, ExtensionMessage, ListenerConfig, Msg,
};

/// The routing key of the calculate solution extension point.
const ROUTING_KEY: &str = "urn:extensionPoint:vm:calculateSolution";

#[derive(Clone, Default)]
struct Calls(Arc<Mutex<u32>>);

impl From<&Calls> for Arc<Mutex<u32>> {
    fn from(calls: &Calls) -> Self {
        calls.0.clone()
    }
}

async fn handler() {}

async fn echo(proposal: Body<SolutionProposal>) -> Option<Body<SolutionProposal>> {
    Some(proposal)
}

async fn echo_decoded(Msg(value): Msg<serde_json::Value>) -> Option<Msg<serde_json::Value>> {
    Some(Msg(value))
}

async fn handler_with_union(
    message: ExtensionMessage<SolutionProposal>,
) -> Option<Body<SolutionProposal>> {
    match message {
        ExtensionMessage::Payload(proposal) => Some(proposal),
        ExtensionMessage::Error(_) => None,
    }
}

async fn handler_with_two_extractors(_req_id: ReqId, state: State<Arc<Mutex<u32>>>) {
    *state.lock().unwrap() += 1;
}

fn config() -> ListenerConfig {
    ListenerConfig::new("reference-service-exchange", "test-queue")
}

fn app() -> App<Calls> {
    App::new(Calls::default())
        .listener(ROUTING_KEY, handler, config())
        .listener(ROUTING_KEY, echo, config())
        .listener(ROUTING_KEY, echo_decoded, config())
        .listener(ROUTING_KEY, handler_with_union, config())
        .listener(ROUTING_KEY, handler_with_two_extractors, config())
}

/// Verifies that the above handlers compile as handlers, and that an unconfigured app refuses to run.
#[tokio::test]
async fn unconfigured_app_does_not_run() {
    let result = app().run().await;
    assert!(matches!(result, Err(Error::NotConfigured)), "{result:?}");
}

#[tokio::test]
async fn app_without_listeners_does_not_run() {
    let result = App::new(())
        .configure("localhost", "guest", "guest")
        .run()
        .await;
    assert!(matches!(result, Err(Error::NoHandlers)), "{result:?}");
}

#[test]
fn configure_reads_port_from_host() {
    let app = App::new(()).configure("broker.example.com:5673", "svc", "secret");
    let broker = app.broker.as_ref().unwrap();
    assert_eq!(broker.authority.host, "broker.example.com");
    assert_eq!(broker.authority.port, 5673);
    assert_eq!(broker.authority.userinfo.username, "svc");
    assert_eq!(broker.authority.userinfo.password, "secret");

    let app = App::new(()).configure("broker.example.com", "svc", "secret");
    let broker = app.broker.as_ref().unwrap();
    assert_eq!(broker.authority.host, "broker.example.com");
    assert_eq!(broker.authority.port, App::<()>::DEFAULT_PORT);
}

#[test]
fn debug_output_hides_credentials() {
    let app = App::new(()).configure("broker.example.com", "svc", "secret");
    let debug = format!("{app:?}");
    assert!(debug.contains("broker.example.com"), "{debug}");
    assert!(!debug.contains("secret"), "{debug}");
}
