//! Bulk preload of the artifacts a blueprint needs.

use std::collections::{HashMap, HashSet};

use modshim_core::{Component, ModuleSource, SourceRegistry};
use tracing::{debug, info};

use crate::error::{OciError, OciResult};
use crate::puller::ArtifactPuller;
use crate::reference::OciReference;

/// Distinct base OCI references used by `components`, in first-use order.
///
/// Aliases are expanded through `sources`. A malformed reference is an error.
pub fn collect_references(
    components: &[Component],
    sources: &SourceRegistry,
) -> OciResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut references = Vec::new();

    for component in components {
        if let ModuleSource::Oci { reference, .. } = sources.resolve(component) {
            let parsed = OciReference::parse(&reference)?;
            let canonical = parsed.to_string();
            if seen.insert(canonical.clone()) {
                references.push(canonical);
            }
        }
    }

    Ok(references)
}

/// Artifact bytes keyed by `registry/repository:tag`.
///
/// The store never fetches on demand: whatever was not preloaded is missing.
#[derive(Debug, Default, Clone)]
pub struct ArtifactStore {
    artifacts: HashMap<String, Vec<u8>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull every reference in one call to `puller`.
    ///
    /// Nothing is pulled for an empty list. Any requested reference missing
    /// from the puller's answer fails the whole preload.
    pub async fn preload(puller: &dyn ArtifactPuller, references: &[String]) -> OciResult<Self> {
        if references.is_empty() {
            debug!("No OCI artifacts to preload");
            return Ok(Self::default());
        }

        info!("Preloading {} OCI artifact(s)", references.len());
        let artifacts = puller.pull(references).await?;

        for raw in references {
            let key = OciReference::parse(raw)?.cache_key();
            if !artifacts.contains_key(&key) {
                return Err(OciError::Registry {
                    reference: raw.clone(),
                    message: "artifact missing from pull result".to_string(),
                });
            }
        }

        Ok(Self { artifacts })
    }

    /// Add or replace an artifact directly.
    pub fn insert(&mut self, cache_key: impl Into<String>, data: Vec<u8>) {
        self.artifacts.insert(cache_key.into(), data);
    }

    pub fn get(&self, reference: &OciReference) -> OciResult<&[u8]> {
        self.artifacts
            .get(&reference.cache_key())
            .map(Vec::as_slice)
            .ok_or_else(|| OciError::NotInCache(reference.to_string()))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puller::StaticPuller;
    use modshim_core::Source;

    fn components() -> Vec<Component> {
        vec![
            Component::new("a").with_source("oci://reg/repo:v1//terraform/a"),
            Component::new("b").with_source("oci://reg/repo:v1//terraform/b"),
            Component::new("c").with_source("core"),
            Component::new("d"),
            Component::new("e").with_source("git::https://example.com/m.git"),
        ]
    }

    #[test]
    fn test_collect_dedupes_and_expands_aliases() {
        let sources = SourceRegistry::new([Source::new("core", "oci://reg/core").with_tag("v2")]);
        let refs = collect_references(&components(), &sources).unwrap();
        assert_eq!(refs, vec!["oci://reg/repo:v1", "oci://reg/core:v2"]);
    }

    #[test]
    fn test_collect_rejects_malformed_reference() {
        let comps = vec![Component::new("x").with_source("oci://no-tag/repo")];
        let err = collect_references(&comps, &SourceRegistry::default()).unwrap_err();
        assert!(err.to_string().contains("oci://no-tag/repo"));
    }

    #[tokio::test]
    async fn test_preload_pulls_each_reference_once() {
        let puller = StaticPuller::new()
            .with_artifact("reg/repo:v1", vec![1])
            .with_artifact("reg/core:v2", vec![2]);
        let sources = SourceRegistry::new([Source::new("core", "oci://reg/core").with_tag("v2")]);
        let refs = collect_references(&components(), &sources).unwrap();

        let store = ArtifactStore::preload(&puller, &refs).await.unwrap();

        assert_eq!(store.len(), 2);
        let requests = puller.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].len(), 2);
    }

    #[tokio::test]
    async fn test_preload_without_references_makes_no_request() {
        let puller = StaticPuller::new();
        let store = ArtifactStore::preload(&puller, &[]).await.unwrap();
        assert!(store.is_empty());
        assert!(puller.requests().is_empty());
    }

    #[tokio::test]
    async fn test_preload_fails_when_artifact_missing() {
        let puller = StaticPuller::new();
        let err = ArtifactStore::preload(&puller, &["oci://reg/repo:v1".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("oci://reg/repo:v1"));
    }

    #[test]
    fn test_get_missing_is_not_in_cache() {
        let store = ArtifactStore::new();
        let reference = OciReference::parse("oci://reg/repo:v1").unwrap();
        let err = store.get(&reference).unwrap_err();
        assert!(err.to_string().contains("not found in cache"));
    }
}
