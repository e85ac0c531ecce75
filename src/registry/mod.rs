pub mod api;
pub mod auth;
pub mod ecr;
pub mod manifest;

use std::sync::Arc;

use oci_client::{Reference, manifest::OciImageManifest, secrets::RegistryAuth};
use tracing::debug;

use crate::charts::access::AllowList;
use crate::charts::error::ServiceError;
use crate::charts::reference::Selector;
use api::{ImageDetail, LayerStream, RegistryApi, RemoteError, Repository};

/// Chart oriented view of the registry.
///
/// Wraps a [`RegistryApi`] and turns its raw outcomes into [`ServiceError`]s.
#[derive(Clone)]
pub struct RegistryClient {
    api: Arc<dyn RegistryApi>,
    region: String,
}

impl RegistryClient {
    pub fn new(api: Arc<dyn RegistryApi>, region: impl Into<String>) -> Self {
        Self {
            api,
            region: region.into(),
        }
    }

    /// Host name of the private registry owned by `account_id`.
    pub fn registry_host(&self, account_id: &str) -> String {
        format!("{account_id}.dkr.ecr.{}.amazonaws.com", self.region)
    }

    pub async fn describe_image(
        &self,
        repository: &str,
        selector: Option<&Selector>,
    ) -> Result<Vec<ImageDetail>, ServiceError> {
        let images = self
            .api
            .describe_images(repository, selector)
            .await
            .map_err(|err| match err {
                RemoteError::ImageNotFound(_) => not_found(repository, selector),
                RemoteError::RepositoryNotFound(_) => ServiceError::RepositoryNotFound(format!(
                    "chart not found in repository: {repository}"
                )),
                err => ServiceError::UpstreamFailure(format!("failed to describe images: {err}")),
            })?;

        if images.is_empty() {
            return Err(not_found(repository, selector));
        }

        Ok(images)
    }

    /// Repositories that are both allowed and present in the registry.
    pub async fn list_repositories(
        &self,
        allowed: &AllowList,
    ) -> Result<Vec<Repository>, ServiceError> {
        if allowed.is_empty() {
            return Ok(Vec::new());
        }

        let repositories = self
            .api
            .describe_repositories(&allowed.names())
            .await
            .map_err(ServiceError::upstream("failed to list repositories"))?;

        Ok(repositories
            .into_iter()
            .filter(|r| allowed.is_allowed(&r.repository_name))
            .collect())
    }

    /// Exchange the registry token for credentials usable on image pulls.
    pub async fn authenticate(&self) -> Result<RegistryAuth, ServiceError> {
        let token = self
            .api
            .authorization_token()
            .await
            .map_err(ServiceError::upstream("failed to get authorization token"))?;

        auth::decode_token(&token)
            .map_err(ServiceError::upstream("invalid authorization token"))
    }

    pub async fn fetch_manifest(
        &self,
        account_id: &str,
        repository: &str,
        selector: &Selector,
        auth: &RegistryAuth,
    ) -> Result<OciImageManifest, ServiceError> {
        let host = self.registry_host(account_id);
        let reference = match selector {
            Selector::Tag(tag) => Reference::with_tag(host, repository.to_string(), tag.clone()),
            Selector::Digest(digest) => {
                Reference::with_digest(host, repository.to_string(), digest.clone())
            }
        };
        debug!(%reference, "pulling manifest");

        match self.api.pull_manifest(&reference, auth).await {
            Ok(Some(manifest)) => Ok(manifest),
            Ok(None) | Err(RemoteError::ImageNotFound(_) | RemoteError::RepositoryNotFound(_)) => {
                Err(ServiceError::ImageNotFound(format!(
                    "image manifest not found for {reference}"
                )))
            }
            Err(err) => Err(ServiceError::UpstreamFailure(format!(
                "failed to get image manifest: {err}"
            ))),
        }
    }

    pub async fn fetch_layer_bytes(
        &self,
        repository: &str,
        digest: &str,
    ) -> Result<LayerStream, ServiceError> {
        let url = self
            .api
            .layer_download_url(repository, digest)
            .await
            .map_err(ServiceError::upstream(
                "failed to get download url for layer",
            ))?;
        debug!(url = %redact(&url), "downloading layer");

        self.api
            .download(&url)
            .await
            .map_err(ServiceError::upstream("failed to download layer"))
    }
}

fn not_found(repository: &str, selector: Option<&Selector>) -> ServiceError {
    selector.map_or_else(
        || {
            ServiceError::RepositoryNotFound(format!(
                "chart not found in repository: {repository}"
            ))
        },
        |selector| ServiceError::ImageNotFound(format!("chart not found with {selector}")),
    )
}

/// Drop the query string of a pre-signed URL before it is logged.
pub fn redact(url: &str) -> String {
    url::Url::parse(url).map_or_else(
        |_| "<invalid url>".to_string(),
        |mut url| {
            url.set_query(None);
            url.to_string()
        },
    )
}

#[cfg(test)]
pub mod stub {
    //! Call counting [`RegistryApi`] used by tests across the crate.
    #![allow(clippy::unwrap_used)]

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;

    use super::*;

    #[derive(Default)]
    pub struct StubRegistry {
        pub calls: AtomicUsize,
        pub images: Vec<ImageDetail>,
        pub describe_error: Option<RemoteError>,
        pub repositories: Vec<Repository>,
        pub token: String,
        pub manifest: Option<OciImageManifest>,
        pub layer: Vec<u8>,
        pub download_status: Option<u16>,
        pub pulled: Mutex<Vec<String>>,
        pub downloaded: Mutex<HashMap<String, String>>,
    }

    impl StubRegistry {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RegistryApi for StubRegistry {
        async fn describe_images(
            &self,
            _repository: &str,
            _selector: Option<&Selector>,
        ) -> Result<Vec<ImageDetail>, RemoteError> {
            self.hit();
            if let Some(err) = &self.describe_error {
                return Err(err.clone());
            }
            Ok(self.images.clone())
        }

        async fn describe_repositories(
            &self,
            names: &[String],
        ) -> Result<Vec<Repository>, RemoteError> {
            self.hit();
            Ok(self
                .repositories
                .iter()
                .filter(|r| names.contains(&r.repository_name))
                .cloned()
                .collect())
        }

        async fn authorization_token(&self) -> Result<String, RemoteError> {
            self.hit();
            Ok(self.token.clone())
        }

        async fn pull_manifest(
            &self,
            reference: &Reference,
            _auth: &RegistryAuth,
        ) -> Result<Option<OciImageManifest>, RemoteError> {
            self.hit();
            self.pulled.lock().unwrap().push(reference.whole());
            Ok(self.manifest.clone())
        }

        async fn layer_download_url(
            &self,
            repository: &str,
            digest: &str,
        ) -> Result<String, RemoteError> {
            self.hit();
            let url = format!("https://layers.example.com/{repository}/{digest}?X-Amz-Signature=s");
            self.downloaded
                .lock()
                .unwrap()
                .insert(digest.to_string(), url.clone());
            Ok(url)
        }

        async fn download(&self, url: &str) -> Result<LayerStream, RemoteError> {
            self.hit();
            if let Some(code) = self.download_status {
                return Err(RemoteError::Status {
                    code,
                    url: url.to_string(),
                });
            }
            let chunks: Vec<Result<Bytes, std::io::Error>> = self
                .layer
                .chunks(7)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Ok(futures::stream::iter(chunks).boxed())
        }
    }

    pub fn manifest_with_layers(layers: &[(&str, &str)]) -> OciImageManifest {
        let layers: Vec<serde_json::Value> = layers
            .iter()
            .map(|(media_type, digest)| {
                serde_json::json!({"mediaType": media_type, "digest": digest, "size": 1})
            })
            .collect();
        serde_json::from_value(serde_json::json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.cncf.helm.config.v1+json",
                "digest": "sha256:cfg",
                "size": 1
            },
            "layers": layers
        }))
        .unwrap()
    }
}
