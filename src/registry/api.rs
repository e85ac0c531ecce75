//! The remote registry as seen by the rest of the crate.
//!
//! [`RegistryApi`] is the seam between chart logic and the network. The
//! production implementation lives in [`super::ecr`]; tests substitute stubs.
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use oci_client::{Reference, manifest::OciImageManifest, secrets::RegistryAuth};
use serde::Serialize;
use thiserror::Error;

use crate::charts::reference::Selector;

/// Raw bytes of a layer blob. Can only be consumed once.
pub type LayerStream = BoxStream<'static, Result<Bytes, io::Error>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),
    #[error("image not found: {0}")]
    ImageNotFound(String),
    #[error("unexpected status {code} from {url}")]
    Status { code: u16, url: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Metadata for one image stored in a repository.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDetail {
    pub registry_id: Option<String>,
    pub repository_name: Option<String>,
    pub image_digest: Option<String>,
    pub image_tags: Vec<String>,
    pub image_size_in_bytes: Option<i64>,
    pub image_pushed_at: Option<DateTime<Utc>>,
    pub image_manifest_media_type: Option<String>,
    pub artifact_media_type: Option<String>,
}

/// Metadata for one repository.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_field_names)]
pub struct Repository {
    pub repository_name: String,
    pub repository_uri: Option<String>,
    pub repository_arn: Option<String>,
    pub registry_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Images in `repository`, optionally restricted to one selector.
    async fn describe_images(
        &self,
        repository: &str,
        selector: Option<&Selector>,
    ) -> Result<Vec<ImageDetail>, RemoteError>;

    /// Repositories whose name is in `names`. Names unknown to the registry are skipped.
    async fn describe_repositories(&self, names: &[String]) -> Result<Vec<Repository>, RemoteError>;

    /// Base64 encoded `username:password` registry token.
    async fn authorization_token(&self) -> Result<String, RemoteError>;

    /// Pull an image manifest. `None` if the reference resolves to no image manifest.
    async fn pull_manifest(
        &self,
        reference: &Reference,
        auth: &RegistryAuth,
    ) -> Result<Option<OciImageManifest>, RemoteError>;

    /// A short lived URL the layer blob can be downloaded from.
    async fn layer_download_url(
        &self,
        repository: &str,
        digest: &str,
    ) -> Result<String, RemoteError>;

    /// Start downloading `url`. Non success statuses are errors.
    async fn download(&self, url: &str) -> Result<LayerStream, RemoteError>;
}
