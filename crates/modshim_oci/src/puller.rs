//! Artifact pulling from OCI registries.
//!
//! Uses the `oci-distribution` crate to fetch the first layer of each
//! artifact. The layer is kept in memory; extraction reads it from there.

use std::collections::HashMap;

use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{OciError, OciResult};
use crate::reference::OciReference;

/// Bulk artifact source.
///
/// Input references are deduplicated `oci://registry/repo:tag` strings without
/// subpath. The result is keyed by `registry/repo:tag`.
#[async_trait]
pub trait ArtifactPuller: Send + Sync {
    async fn pull(&self, references: &[String]) -> OciResult<HashMap<String, Vec<u8>>>;
}

/// Credentials for a container registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryCredentials {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryCredentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Read `MODSHIM_REGISTRY_USERNAME` and `MODSHIM_REGISTRY_PASSWORD`.
    ///
    /// Falls back to anonymous if either is unset.
    pub fn from_env() -> Self {
        let username = std::env::var("MODSHIM_REGISTRY_USERNAME").ok();
        let password = std::env::var("MODSHIM_REGISTRY_PASSWORD").ok();
        if username.is_some() && password.is_some() {
            Self { username, password }
        } else {
            Self::anonymous()
        }
    }

    fn to_oci_auth(&self) -> RegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => RegistryAuth::Basic(u.clone(), p.clone()),
            _ => RegistryAuth::Anonymous,
        }
    }
}

/// Pulls artifacts from remote registries.
pub struct RegistryPuller {
    client: Client,
    credentials: RegistryCredentials,
}

impl Default for RegistryPuller {
    fn default() -> Self {
        Self::new(RegistryCredentials::anonymous())
    }
}

impl RegistryPuller {
    pub fn new(credentials: RegistryCredentials) -> Self {
        Self::with_protocol(credentials, ClientProtocol::Https)
    }

    /// Puller using credentials from the environment.
    pub fn from_env() -> Self {
        Self::new(RegistryCredentials::from_env())
    }

    /// Puller with an explicit protocol, e.g. plain HTTP for a local registry.
    pub fn with_protocol(credentials: RegistryCredentials, protocol: ClientProtocol) -> Self {
        let config = ClientConfig {
            protocol,
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            credentials,
        }
    }

    async fn pull_one(&self, reference: &OciReference) -> OciResult<Vec<u8>> {
        let registry_error = |message: String| OciError::Registry {
            reference: reference.to_string(),
            message,
        };

        let oci_ref: Reference = reference
            .cache_key()
            .parse()
            .map_err(|e| registry_error(format!("invalid reference: {}", e)))?;
        let auth = self.credentials.to_oci_auth();

        let (manifest, digest) = self
            .client
            .pull_image_manifest(&oci_ref, &auth)
            .await
            .map_err(|e| registry_error(format!("failed to pull manifest: {}", e)))?;

        let layer = manifest
            .layers
            .first()
            .ok_or_else(|| registry_error("artifact has no layers".to_string()))?;

        let mut data: Vec<u8> = Vec::new();
        self.client
            .pull_blob(&oci_ref, layer, &mut data)
            .await
            .map_err(|e| registry_error(format!("failed to pull layer {}: {}", layer.digest, e)))?;

        debug!(
            reference = %reference,
            digest = %digest,
            bytes = data.len(),
            "Pulled artifact layer"
        );
        Ok(data)
    }
}

#[async_trait]
impl ArtifactPuller for RegistryPuller {
    async fn pull(&self, references: &[String]) -> OciResult<HashMap<String, Vec<u8>>> {
        let mut artifacts = HashMap::with_capacity(references.len());
        for raw in references {
            let reference = OciReference::parse(raw)?;
            info!(reference = %reference, "Pulling OCI artifact");
            let data = self.pull_one(&reference).await?;
            artifacts.insert(reference.cache_key(), data);
        }
        Ok(artifacts)
    }
}

/// In-memory puller serving fixed artifacts and recording every request.
///
/// Useful offline and in tests.
#[derive(Default)]
pub struct StaticPuller {
    artifacts: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<Vec<String>>>,
}

impl StaticPuller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` for `registry/repo:tag`.
    pub fn with_artifact(mut self, cache_key: impl Into<String>, data: Vec<u8>) -> Self {
        self.artifacts.insert(cache_key.into(), data);
        self
    }

    /// Every `pull` call's reference list, in call order.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ArtifactPuller for StaticPuller {
    async fn pull(&self, references: &[String]) -> OciResult<HashMap<String, Vec<u8>>> {
        self.requests.lock().push(references.to_vec());
        let mut artifacts = HashMap::new();
        for raw in references {
            let key = OciReference::parse(raw)?.cache_key();
            if let Some(data) = self.artifacts.get(&key) {
                artifacts.insert(key, data.clone());
            }
        }
        Ok(artifacts)
    }
}
