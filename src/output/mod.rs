// Copyright (C) 2022 Electronic Arts, Inc. All rights reserved.

//! Render query results for the terminal.
use anyhow::{Context, Result};
use serde::Serialize;

use crate::registry::api::{ImageDetail, Repository};

pub mod text;

/// How results are written to stdout.
#[derive(Copy, Clone, clap::ValueEnum, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    /// Markdown tables.
    Text,
    /// Pretty printed JSON.
    Json,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to encode JSON output")
}

pub fn repositories(format: OutputFormat, repositories: &[Repository]) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text::repositories_to_string(repositories)),
        OutputFormat::Json => to_json(repositories),
    }
}

pub fn images(format: OutputFormat, images: &[ImageDetail]) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text::images_to_string(images)),
        OutputFormat::Json => to_json(images),
    }
}
