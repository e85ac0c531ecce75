//! Lazily resolved account identity shared by every request.
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{error, info};

use super::error::ServiceError;
use crate::registry::api::RemoteError;

/// Looks up the account that owns the registry.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn account_id(&self) -> Result<String, RemoteError>;
}

/// Single flight cache around an [`IdentityProvider`].
///
/// The first caller performs the lookup. Concurrent callers wait for it and
/// all later callers receive the same outcome. A failed lookup is cached as
/// well and is never retried for the lifetime of the cache.
pub struct IdentityCache {
    provider: Arc<dyn IdentityProvider>,
    resolved: OnceCell<Result<String, ServiceError>>,
}

impl IdentityCache {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            resolved: OnceCell::new(),
        }
    }

    pub async fn resolve_identity(&self) -> Result<String, ServiceError> {
        self.resolved
            .get_or_init(|| async {
                match self.provider.account_id().await {
                    Ok(account_id) => {
                        info!(%account_id, "resolved registry account");
                        Ok(account_id)
                    }
                    Err(err) => {
                        error!(error = %err, "failed to resolve registry account");
                        Err(ServiceError::UpstreamFailure(format!(
                            "failed to resolve account id: {err}"
                        )))
                    }
                }
            })
            .await
            .clone()
    }
}
