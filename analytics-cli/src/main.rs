use std::sync::{Arc, Mutex, PoisonError};

use analytics_core::config::Config;
use analytics_core::timestamp::format_with_millis;
use analytics_core::{
    build_message, Callback, ClientBuilder, DeliveryClient, DeliveryError, TypedMessage,
};
use anyhow::{Context, Result};
use clap::Parser;
use envconfig::Envconfig;
use tracing::info;

mod args;

use crate::args::Args;

/// Remembers how the one message we send was settled.
#[derive(Default)]
struct DeliveryReport {
    outcome: Mutex<Option<Result<(), DeliveryError>>>,
}

impl DeliveryReport {
    fn settle(&self, outcome: Result<(), DeliveryError>) {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(outcome);
        }
    }

    fn result(&self) -> Result<()> {
        let outcome = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(e).context("Failed to deliver message"),
            None => anyhow::bail!("Message was never acknowledged"),
        }
    }
}

impl Callback for DeliveryReport {
    fn success(&self, _message: &TypedMessage) {
        self.settle(Ok(()));
    }

    fn failure(&self, _message: &TypedMessage, error: &DeliveryError) {
        self.settle(Err(error.clone()));
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::init_from_env().context("Invalid configuration")?;

    let message = build_message(&args.descriptor()?)?;
    let kind = message.kind();
    let message_id = message.message_id().to_owned();
    let timestamp = format_with_millis(message.metadata().timestamp);

    let report = Arc::new(DeliveryReport::default());
    let mut builder = ClientBuilder::from_config(&args.write_key, &config)
        .flush_at(1)
        .callback(report.clone());
    if let Some(host) = &args.host {
        builder = builder.host(host);
    }
    let client = builder.build()?;

    client.enqueue(message);
    client.flush().await;
    client.shutdown().await;

    report.result()?;

    info!("Sent {kind} message {message_id} stamped {timestamp}");
    Ok(())
}

#[tokio::main]
async fn main() {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    if let Err(e) = run(Args::parse()).await {
        eprintln!("Oops! {e}");

        let mut causes = e.chain().skip(1).peekable();
        if causes.peek().is_some() {
            eprintln!("\nCaused by:");
            for (index, cause) in causes.enumerate() {
                eprintln!("    {index}: {cause}");
            }
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use analytics_core::message::{Metadata, TrackMessage};

    use super::*;

    fn message() -> TypedMessage {
        TypedMessage::Track(TrackMessage {
            event: "Clicked".to_owned(),
            properties: Default::default(),
            metadata: Metadata::default(),
        })
    }

    #[test]
    fn first_settlement_wins() {
        let report = DeliveryReport::default();
        report.success(&message());
        report.failure(&message(), &DeliveryError::ShutDown);

        assert!(report.result().is_ok());
    }

    #[test]
    fn failures_carry_the_delivery_error() {
        let report = DeliveryReport::default();
        report.failure(
            &message(),
            &DeliveryError::Rejected {
                status: 401,
                body: "unauthorized".to_owned(),
            },
        );

        let error = report.result().unwrap_err();
        assert_eq!(error.to_string(), "Failed to deliver message");
        assert_eq!(
            error.root_cause().to_string(),
            "batch rejected with status 401: unauthorized"
        );
    }

    #[test]
    fn outcomes_survive_a_poisoned_lock() {
        let report = Arc::new(DeliveryReport::default());

        let poisoner = report.clone();
        let panicked = std::thread::spawn(move || {
            let _guard = poisoner.outcome.lock().unwrap();
            panic!("callback panicked while holding the report");
        })
        .join();
        assert!(panicked.is_err());
        assert!(report.outcome.is_poisoned());

        report.failure(&message(), &DeliveryError::ShutDown);

        let error = report.result().unwrap_err();
        assert_eq!(error.root_cause().to_string(), "client has been shut down");
    }

    #[test]
    fn unacknowledged_messages_are_errors() {
        assert!(DeliveryReport::default().result().is_err());
    }
}
