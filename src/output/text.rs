// Copyright (C) 2022 Electronic Arts, Inc. All rights reserved.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use tabled::Table;
use tabled::Tabled;
use tabled::settings::Alignment;
use tabled::settings::Modify;
use tabled::settings::Style;
use tabled::settings::object::Rows;

use crate::registry::api::{ImageDetail, Repository};

struct DisplayableOption<T>(Option<T>);

impl<T: Display> Display for DisplayableOption<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(value) = &self.0 {
            write!(f, "{value}")
        } else {
            write!(f, "-")
        }
    }
}

#[derive(Tabled)]
struct RepositoryRow<'a> {
    repository: &'a str,
    uri: DisplayableOption<&'a str>,
    created: DisplayableOption<DateTime<Utc>>,
}

#[derive(Tabled)]
struct ImageRow<'a> {
    tags: String,
    digest: DisplayableOption<&'a str>,
    #[tabled(rename = "size")]
    size_in_bytes: DisplayableOption<i64>,
    pushed: DisplayableOption<DateTime<Utc>>,
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        None => s,
        Some((idx, _)) => &s[..idx],
    }
}

pub fn repositories_to_string(repositories: &[Repository]) -> String {
    let data: Vec<RepositoryRow> = repositories
        .iter()
        .map(|r| RepositoryRow {
            repository: &r.repository_name,
            uri: DisplayableOption(r.repository_uri.as_deref()),
            created: DisplayableOption(r.created_at),
        })
        .collect();

    Table::new(data)
        .with(Style::markdown())
        .with(Modify::new(Rows::new(..)).with(Alignment::left()))
        .to_string()
}

pub fn images_to_string(images: &[ImageDetail]) -> String {
    let data: Vec<ImageRow> = images
        .iter()
        .map(|i| ImageRow {
            tags: i.image_tags.join(","),
            // sha256: plus the first 12 hex characters.
            digest: DisplayableOption(i.image_digest.as_deref().map(|d| truncate(d, 19))),
            size_in_bytes: DisplayableOption(i.image_size_in_bytes),
            pushed: DisplayableOption(i.image_pushed_at),
        })
        .collect();

    Table::new(data)
        .with(Style::markdown())
        .with(Modify::new(Rows::new(..)).with(Alignment::left()))
        .to_string()
}
