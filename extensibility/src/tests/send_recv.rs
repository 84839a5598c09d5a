use std::{num::NonZeroU16, time::Duration};

use futures::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, ExchangeKind,
};
use tracing::info;

use crate::{
    platform::{ExtensionErrorMessage, SolutionProposal},
    tests::init_logging,
    App, Body, ContentType, ExtensionMessage, ListenerConfig,
};

use super::amqp_connect;

const EXCHANGE: &str = "extensibility-test-exchange";
const QUEUE: &str = "extensibility-test-solution-queue";
const ROUTING_KEY: &str = "urn:extensionPoint:vm:calculateSolution";

const PROPOSAL_JSON: &[u8] = br#"{"href":"https://vcd.example.com/api/workflow/1","proposedSolution":{"subjectHubAssignment":[{"subjectUri":"urn:vcloud:vm:1","hubUri":"urn:vcloud:hub:a","priority":3}],"score":7}}"#;

const PANIC_ROUTING_KEY: &str = "extensibility-test-panic";
const PANIC_QUEUE: &str = "extensibility-test-panic-queue";
const PANIC_HUB: &str = "urn:vcloud:hub:panic";

const PANIC_JSON: &[u8] = br#"{"proposedSolution":{"subjectHubAssignment":[{"subjectUri":"urn:vcloud:vm:1","hubUri":"urn:vcloud:hub:panic"}]}}"#;

async fn echo(message: ExtensionMessage<SolutionProposal>) -> Option<Body<SolutionProposal>> {
    match message {
        ExtensionMessage::Payload(proposal) => {
            info!("echo: {:?}", proposal.proposed_hub());
            Some(proposal)
        }
        ExtensionMessage::Error(error) => {
            info!("echo received error: {}", error.message);
            None
        }
    }
}

async fn panic_on_hub(proposal: Body<SolutionProposal>) -> Option<Body<SolutionProposal>> {
    if proposal.proposed_hub() == Some(PANIC_HUB) {
        panic!("cannot place on {PANIC_HUB}");
    }
    Some(proposal)
}

#[tokio::test]
#[ignore = "requires a RabbitMQ broker on localhost:5672"]
async fn it_echoes_proposals_and_ignores_errors() {
    init_logging();
    info!("Connecting to AMQP...");
    let conn = amqp_connect().await;

    info!("Setting up extension app...");
    let app = App::new(()).listener(
        ROUTING_KEY,
        echo,
        ListenerConfig::new(EXCHANGE, QUEUE)
            .with_declared_exchange(ExchangeKind::Direct)
            .with_content_type(ContentType::Json)
            .with_concurrency(NonZeroU16::new(2).unwrap()),
    );
    let app_shutdown = app.shutdown_channel();
    let app_conn = amqp_connect().await;
    let app = app.run_with_connection(&app_conn);

    let requests = async {
        tokio::time::sleep(Duration::from_secs(3)).await;

        let channel = conn
            .create_channel()
            .await
            .expect("failed to create channel");

        let reply_queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .expect("failed to declare reply queue");
        let mut replies = channel
            .basic_consume(
                reply_queue.name().as_str(),
                "replies",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .expect("failed to consume replies");

        // The error message must not produce a reply, so the only reply is the echoed proposal.
        info!("Sending error message...");
        channel
            .basic_publish(
                EXCHANGE,
                ROUTING_KEY,
                BasicPublishOptions::default(),
                br#"{"message":"previous reply was rejected"}"#,
                BasicProperties::default()
                    .with_reply_to(reply_queue.name().clone())
                    .with_correlation_id("error".into())
                    .with_kind(ExtensionErrorMessage::MESSAGE_TYPE.into()),
            )
            .await
            .expect("failed to publish");

        info!("Sending proposal...");
        channel
            .basic_publish(
                EXCHANGE,
                ROUTING_KEY,
                BasicPublishOptions::default(),
                PROPOSAL_JSON,
                BasicProperties::default()
                    .with_reply_to(reply_queue.name().clone())
                    .with_correlation_id("proposal".into()),
            )
            .await
            .expect("failed to publish");

        let reply = tokio::time::timeout(Duration::from_secs(10), replies.next())
            .await
            .expect("no reply within 10 seconds")
            .expect("reply consumer cancelled")
            .expect("failed to receive reply");
        reply
            .ack(BasicAckOptions::default())
            .await
            .expect("failed to ack reply");

        assert_eq!(
            reply.properties.correlation_id().as_ref().map(|id| id.as_str()),
            Some("proposal")
        );
        assert_eq!(
            reply.properties.content_type().as_ref().map(|t| t.as_str()),
            Some("application/json")
        );
        assert_eq!(reply.data, PROPOSAL_JSON);

        let nothing_else = tokio::time::timeout(Duration::from_secs(1), replies.next()).await;
        assert!(nothing_else.is_err(), "unexpected second reply");

        info!("Sending shutdown signal...");
        app_shutdown.send(()).unwrap();
    };

    let (app_return, ()) = tokio::join!(app, requests);
    assert!(app_return.is_ok(), "{app_return:?}");
}

#[tokio::test]
#[ignore = "requires a RabbitMQ broker on localhost:5672"]
async fn panicking_handler_does_not_block_the_consumer() {
    init_logging();
    let conn = amqp_connect().await;

    // One consumer with a single prefetch slot: a delivery left unsettled by a panic would stall it.
    let app = App::new(()).listener(
        PANIC_ROUTING_KEY,
        panic_on_hub,
        ListenerConfig::new(EXCHANGE, PANIC_QUEUE)
            .with_declared_exchange(ExchangeKind::Direct)
            .with_prefetch(1),
    );
    let app_shutdown = app.shutdown_channel();
    let app_conn = amqp_connect().await;
    let app = app.run_with_connection(&app_conn);

    let requests = async {
        tokio::time::sleep(Duration::from_secs(3)).await;

        let channel = conn
            .create_channel()
            .await
            .expect("failed to create channel");
        let reply_queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .expect("failed to declare reply queue");
        let mut replies = channel
            .basic_consume(
                reply_queue.name().as_str(),
                "panic-replies",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .expect("failed to consume replies");

        for (body, correlation_id) in [
            (PANIC_JSON, "panic-1"),
            (PANIC_JSON, "panic-2"),
            (PROPOSAL_JSON, "proposal"),
        ] {
            channel
                .basic_publish(
                    EXCHANGE,
                    PANIC_ROUTING_KEY,
                    BasicPublishOptions::default(),
                    body,
                    BasicProperties::default()
                        .with_reply_to(reply_queue.name().clone())
                        .with_correlation_id(correlation_id.into()),
                )
                .await
                .expect("failed to publish");
        }

        let reply = tokio::time::timeout(Duration::from_secs(10), replies.next())
            .await
            .expect("consumer stalled after handler panics")
            .expect("reply consumer cancelled")
            .expect("failed to receive reply");
        reply
            .ack(BasicAckOptions::default())
            .await
            .expect("failed to ack reply");
        assert_eq!(
            reply.properties.correlation_id().as_ref().map(|id| id.as_str()),
            Some("proposal")
        );
        assert_eq!(reply.data, PROPOSAL_JSON);

        app_shutdown.send(()).unwrap();
    };

    let (app_return, ()) = tokio::join!(app, requests);
    assert!(app_return.is_ok(), "{app_return:?}");
}
