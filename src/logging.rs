// Copyright (C) 2022 Electronic Arts, Inc. All rights reserved.

//! Logging library.
//!
//! Sends all tracing events to stderr so stdout stays free for results.
use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// How log entries are rendered.
#[derive(Copy, Clone, clap::ValueEnum, Debug, Eq, PartialEq)]
pub enum LogFormat {
    /// Human readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init(format: LogFormat, default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|err| anyhow!("Invalid log filter: {err}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|err| anyhow!("Failed to initialise logging: {err}"))
}
