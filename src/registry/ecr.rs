//! Amazon ECR backed collaborators.
use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ecr::error::DisplayErrorContext;
use aws_sdk_ecr::primitives::DateTime as AwsDateTime;
use aws_sdk_ecr::types::ImageIdentifier;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use oci_client::errors::{OciDistributionError, OciErrorCode};
use oci_client::manifest::{OciImageManifest, OciManifest};
use oci_client::{Client, Reference, secrets::RegistryAuth};
use tracing::debug;

use super::api::{ImageDetail, LayerStream, RegistryApi, RemoteError, Repository};
use super::manifest::ACCEPTED_MANIFEST_MEDIA_TYPES;
use crate::charts::identity::IdentityProvider;
use crate::charts::reference::Selector;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry backed by the ECR API, an OCI distribution client and plain HTTPS.
pub struct EcrRegistry {
    ecr: aws_sdk_ecr::Client,
    oci: Client,
    http: reqwest::Client,
}

impl EcrRegistry {
    pub fn new(config: &SdkConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            ecr: aws_sdk_ecr::Client::new(config),
            oci: Client::new(build_client_config()),
            http,
        })
    }
}

fn build_client_config() -> oci_client::client::ClientConfig {
    let protocol = oci_client::client::ClientProtocol::Https;

    oci_client::client::ClientConfig {
        protocol,
        ..Default::default()
    }
}

fn image_identifier(selector: &Selector) -> ImageIdentifier {
    match selector {
        Selector::Tag(tag) => ImageIdentifier::builder().image_tag(tag).build(),
        Selector::Digest(digest) => ImageIdentifier::builder().image_digest(digest).build(),
    }
}

fn to_chrono(date: Option<&AwsDateTime>) -> Option<DateTime<Utc>> {
    date.and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos()))
}

fn transport<E: std::error::Error + 'static>(err: &E) -> RemoteError {
    RemoteError::Transport(DisplayErrorContext(err).to_string())
}

fn is_not_found(err: &OciDistributionError) -> bool {
    match err {
        OciDistributionError::ImageManifestNotFoundError(_) => true,
        OciDistributionError::ServerError { code, .. } => *code == 404,
        OciDistributionError::RegistryError { envelope, .. } => envelope
            .errors
            .iter()
            .any(|e| {
                matches!(
                    e.code,
                    OciErrorCode::ManifestUnknown | OciErrorCode::NameUnknown
                )
            }),
        _ => false,
    }
}

#[async_trait]
impl RegistryApi for EcrRegistry {
    async fn describe_images(
        &self,
        repository: &str,
        selector: Option<&Selector>,
    ) -> Result<Vec<ImageDetail>, RemoteError> {
        let mut request = self.ecr.describe_images().repository_name(repository);
        if let Some(selector) = selector {
            request = request.image_ids(image_identifier(selector));
        }

        let mut pages = request.into_paginator().items().send();
        let mut images = Vec::new();
        while let Some(item) = pages.next().await {
            let detail = item.map_err(|err| match err.as_service_error() {
                Some(e) if e.is_image_not_found_exception() => {
                    RemoteError::ImageNotFound(e.to_string())
                }
                Some(e) if e.is_repository_not_found_exception() => {
                    RemoteError::RepositoryNotFound(e.to_string())
                }
                _ => transport(&err),
            })?;

            images.push(ImageDetail {
                registry_id: detail.registry_id().map(ToString::to_string),
                repository_name: detail.repository_name().map(ToString::to_string),
                image_digest: detail.image_digest().map(ToString::to_string),
                image_tags: detail.image_tags().to_vec(),
                image_size_in_bytes: detail.image_size_in_bytes(),
                image_pushed_at: to_chrono(detail.image_pushed_at()),
                image_manifest_media_type: detail
                    .image_manifest_media_type()
                    .map(ToString::to_string),
                artifact_media_type: detail.artifact_media_type().map(ToString::to_string),
            });
        }

        Ok(images)
    }

    async fn describe_repositories(
        &self,
        names: &[String],
    ) -> Result<Vec<Repository>, RemoteError> {
        // Asking for the names directly fails the whole call when one is missing.
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();

        let mut pages = self
            .ecr
            .describe_repositories()
            .into_paginator()
            .items()
            .send();
        let mut repositories = Vec::new();
        while let Some(item) = pages.next().await {
            let repository = item.map_err(|err| transport(&err))?;
            let Some(name) = repository.repository_name() else {
                continue;
            };
            if !wanted.contains(name) {
                continue;
            }

            repositories.push(Repository {
                repository_name: name.to_string(),
                repository_uri: repository.repository_uri().map(ToString::to_string),
                repository_arn: repository.repository_arn().map(ToString::to_string),
                registry_id: repository.registry_id().map(ToString::to_string),
                created_at: to_chrono(repository.created_at()),
            });
        }

        Ok(repositories)
    }

    async fn authorization_token(&self) -> Result<String, RemoteError> {
        let output = self
            .ecr
            .get_authorization_token()
            .send()
            .await
            .map_err(|err| transport(&err))?;

        output
            .authorization_data()
            .first()
            .and_then(|data| data.authorization_token())
            .map(ToString::to_string)
            .ok_or_else(|| RemoteError::InvalidResponse("no authorization data".to_string()))
    }

    async fn pull_manifest(
        &self,
        reference: &Reference,
        auth: &RegistryAuth,
    ) -> Result<Option<OciImageManifest>, RemoteError> {
        let (manifest, digest) = match self.oci.pull_manifest(reference, auth).await {
            Ok(result) => result,
            Err(err) if is_not_found(&err) => return Ok(None),
            Err(err) => return Err(RemoteError::Transport(err.to_string())),
        };
        debug!(%reference, %digest, "pulled manifest");

        let OciManifest::Image(manifest) = manifest else {
            return Ok(None);
        };

        let accepted = manifest
            .media_type
            .as_deref()
            .is_none_or(|media_type| ACCEPTED_MANIFEST_MEDIA_TYPES.contains(&media_type));

        Ok(accepted.then_some(manifest))
    }

    async fn layer_download_url(
        &self,
        repository: &str,
        digest: &str,
    ) -> Result<String, RemoteError> {
        let output = self
            .ecr
            .get_download_url_for_layer()
            .repository_name(repository)
            .layer_digest(digest)
            .send()
            .await
            .map_err(|err| transport(&err))?;

        output
            .download_url()
            .map(ToString::to_string)
            .ok_or_else(|| RemoteError::InvalidResponse("no download url for layer".to_string()))
    }

    async fn download(&self, url: &str) -> Result<LayerStream, RemoteError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                code: status.as_u16(),
                url: super::redact(url),
            });
        }

        Ok(response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed())
    }
}

/// Account lookup through STS.
pub struct StsIdentity {
    sts: aws_sdk_sts::Client,
}

impl StsIdentity {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            sts: aws_sdk_sts::Client::new(config),
        }
    }
}

#[async_trait]
impl IdentityProvider for StsIdentity {
    async fn account_id(&self) -> Result<String, RemoteError> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| transport(&err))?;

        output
            .account()
            .map(ToString::to_string)
            .ok_or_else(|| {
                RemoteError::InvalidResponse("caller identity has no account".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn selector_to_identifier() {
        let tag = image_identifier(&Selector::Tag("1.0.0".to_string()));
        assert_eq!(tag.image_tag(), Some("1.0.0"));
        assert_eq!(tag.image_digest(), None);

        let digest = image_identifier(&Selector::Digest("sha256:abc".to_string()));
        assert_eq!(digest.image_digest(), Some("sha256:abc"));
        assert_eq!(digest.image_tag(), None);
    }

    #[test]
    fn converts_timestamps() {
        let date = AwsDateTime::from_secs(1_700_000_000);
        let converted = to_chrono(Some(&date)).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
        assert_eq!(to_chrono(None), None);
    }

    #[test]
    fn manifest_not_found_errors() {
        assert!(is_not_found(
            &OciDistributionError::ImageManifestNotFoundError("x".to_string())
        ));
        assert!(is_not_found(&OciDistributionError::ServerError {
            code: 404,
            url: "https://example.com".to_string(),
            message: "not found".to_string(),
        }));
        assert!(!is_not_found(&OciDistributionError::ServerError {
            code: 500,
            url: "https://example.com".to_string(),
            message: "boom".to_string(),
        }));
    }

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn test_resolve_account() {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let identity = StsIdentity::new(&config);
        let account = identity.account_id().await.unwrap();
        assert_eq!(account.len(), 12);
    }
}
