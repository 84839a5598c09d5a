//! Startup parameters.

use std::{ffi::OsString, num::NonZeroU16};

use clap::Parser;
use extensibility::ContentType;

/// Hello world object extension for the calculate solution phase.
///
/// Replies to every placement proposal with the proposal itself.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(version)]
pub struct StartupParams {
    /// Host of the RabbitMQ broker, optionally with a port.
    #[arg(value_name = "rmqHost", allow_hyphen_values = true)]
    pub rmq_host: String,
    /// RabbitMQ user.
    #[arg(value_name = "rmqUser", allow_hyphen_values = true)]
    pub rmq_user: String,
    /// RabbitMQ password.
    #[arg(value_name = "rmqPassword", allow_hyphen_values = true)]
    pub rmq_password: String,
    /// Content type the extension was registered with: JSON or XML.
    #[arg(value_name = "contentType")]
    pub content_type: ContentType,
    /// Number of messages handled in parallel, at least 1.
    #[arg(value_name = "concurrentConsumers", value_parser = consumer_count)]
    pub concurrent_consumers: NonZeroU16,
}

impl StartupParams {
    /// The arguments every invocation must supply, in order.
    pub const USAGE: &'static str = "rmqHost rmqUser rmqPassword contentType concurrentConsumers";

    /// Parses the process arguments, program name first.
    ///
    /// # Errors
    /// Returns `Err` unless there are exactly five arguments, the content type is known and the
    /// consumer count is a positive integer. Also returns `Err` for `--help` and `--version`.
    pub fn parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }

    /// The message logged when the arguments could not be parsed.
    pub fn invalid_arguments(error: &clap::Error) -> String {
        format!(
            "Invalid arguments. Following 5 arguments must be supplied: {} \
             (contentType is JSON or XML, concurrentConsumers is a whole number of at least 1)\n{error}",
            Self::USAGE
        )
    }
}

/// Parses the consumer count. Zero consumers would never handle a message.
fn consumer_count(value: &str) -> Result<NonZeroU16, String> {
    let count: u16 = value
        .parse()
        .map_err(|e| format!("{e}; expected a whole number from 1 to {}", u16::MAX))?;
    NonZeroU16::new(count).ok_or_else(|| "must be at least 1".to_string())
}
