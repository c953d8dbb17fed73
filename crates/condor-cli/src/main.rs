#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use condor_core::{Module, Registry};
use condor_elastic::ElasticOutput;
use condor_pastebin::PastebinInput;
use condor_redis::RedisQueue;
use condor_rules::RulesProcessor;
use condor_webhook::WebhookOutput;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "condor_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "condor_cli::shutdown";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SHUTDOWN,
            "application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %error,
            "application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level);
    log_startup_info();

    let config = config::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    let registry = builtin_registry();

    condor_pipeline::boot(&config, &registry)
        .await
        .context("pipeline terminated with error")?;
    Ok(())
}

/// Registers every built-in module driver.
fn builtin_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register("redis", Module::Queue(Arc::new(RedisQueue::new())));
    registry.register("pastebin", Module::Input(Arc::new(PastebinInput::new())));
    registry.register("rules", Module::Processor(Arc::new(RulesProcessor::new())));
    registry.register(
        "elasticsearch",
        Module::Output(Arc::new(ElasticOutput::new())),
    );
    registry.register("webhook", Module::Output(Arc::new(WebhookOutput::new())));
    registry
}

/// Initializes tracing with environment-based filtering.
fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Logs startup information.
fn log_startup_info() {
    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        "starting condor"
    );

    tracing::debug!(
        target: TRACING_TARGET_STARTUP,
        pid = process::id(),
        arch = std::env::consts::ARCH,
        os = std::env::consts::OS,
        "build information"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_covers_every_role() {
        let registry = builtin_registry();
        assert!(registry.queue("redis").is_ok());
        assert!(registry.input("pastebin").is_ok());
        assert!(registry.processor("rules").is_ok());
        assert!(registry.output("elasticsearch").is_ok());
        assert!(registry.output("webhook").is_ok());
    }
}
