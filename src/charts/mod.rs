//! Chart queries against the registry.
//!
//! [`ChartService`] is what front ends depend on; [`EcrChartService`] is the
//! implementation that composes the allow-list, the identity cache, the
//! registry client and the archive extractor.
pub mod access;
pub mod archive;
pub mod error;
pub mod identity;
pub mod reference;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::registry::RegistryClient;
use crate::registry::api::{ImageDetail, Repository};
use crate::registry::manifest;
use access::AllowList;
use archive::ChartFile;
use error::ServiceError;
use identity::{IdentityCache, IdentityProvider};
use reference::{ChartReference, FileRequest};

#[async_trait]
pub trait ChartService: Send + Sync {
    /// Allowed repositories that exist in the registry.
    async fn list_charts(&self) -> Result<Vec<Repository>, ServiceError>;

    /// Images of a chart, optionally narrowed to one tag or digest.
    async fn describe_chart(
        &self,
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Result<Vec<ImageDetail>, ServiceError>;

    /// One file from the packaged chart archive.
    async fn get_chart_file(
        &self,
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
        file_name: &str,
    ) -> Result<ChartFile, ServiceError>;
}

pub struct EcrChartService {
    allow_list: AllowList,
    identity: IdentityCache,
    registry: RegistryClient,
}

impl EcrChartService {
    pub fn new(
        allow_list: AllowList,
        identity: Arc<dyn IdentityProvider>,
        registry: RegistryClient,
    ) -> Self {
        Self {
            allow_list,
            identity: IdentityCache::new(identity),
            registry,
        }
    }
}

#[async_trait]
impl ChartService for EcrChartService {
    async fn list_charts(&self) -> Result<Vec<Repository>, ServiceError> {
        info!(allowed = self.allow_list.len(), "listing chart repositories");
        self.registry.list_repositories(&self.allow_list).await
    }

    async fn describe_chart(
        &self,
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Result<Vec<ImageDetail>, ServiceError> {
        let reference = ChartReference::for_describe(repository, tag, digest)?;
        self.allow_list.check(&reference.repository)?;

        info!(%reference, "describing chart");
        self.registry
            .describe_image(&reference.repository, reference.selector.as_ref())
            .await
    }

    async fn get_chart_file(
        &self,
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
        file_name: &str,
    ) -> Result<ChartFile, ServiceError> {
        let request = FileRequest::new(repository, tag, digest, file_name)?;
        self.allow_list.check(&request.repository)?;

        info!(
            repository = %request.repository,
            selector = %request.selector,
            file = %request.file_name,
            "getting chart file"
        );

        let account_id = self.identity.resolve_identity().await?;
        let auth = self.registry.authenticate().await?;
        let manifest = self
            .registry
            .fetch_manifest(&account_id, &request.repository, &request.selector, &auth)
            .await?;

        let layer = manifest::chart_layer(&manifest).ok_or_else(|| {
            ServiceError::UpstreamFailure(
                "could not find helm chart content layer in manifest".to_string(),
            )
        })?;
        debug!(digest = %layer.digest, "selected chart layer");

        let stream = self
            .registry
            .fetch_layer_bytes(&request.repository, &layer.digest)
            .await?;
        archive::extract_file(stream, &request.file_name).await
    }
}

/// Run `operation`, giving up once `deadline` has passed.
///
/// On expiry the operation is dropped, which closes any open layer stream.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    tokio::time::timeout(deadline, operation)
        .await
        .map_err(|_| {
            ServiceError::UpstreamFailure(format!(
                "deadline exceeded after {}s",
                deadline.as_secs_f64()
            ))
        })?
}
