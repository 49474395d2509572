//! Run-to-run cache of extracted artifacts.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::OciResult;
use crate::extract::extract_artifact;
use crate::preload::ArtifactStore;
use crate::reference::OciReference;

/// Extraction directories keyed by [`OciReference::extraction_key`].
///
/// A module directory that already exists on disk is reused without
/// touching the artifact store. Extraction of one key is serialized by a
/// per-key lock, so concurrent callers never extract the same key twice.
pub struct ExtractionCache {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    extracted: Mutex<HashSet<String>>,
}

impl ExtractionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
            extracted: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory an artifact extracts into.
    pub fn artifact_dir(&self, reference: &OciReference) -> PathBuf {
        self.root.join(reference.extraction_key())
    }

    /// Directory holding `subpath` of the artifact.
    pub fn module_dir(&self, reference: &OciReference, subpath: &str) -> PathBuf {
        let subpath = subpath.trim_matches('/');
        let dir = self.artifact_dir(reference);
        if subpath.is_empty() {
            dir
        } else {
            dir.join(subpath)
        }
    }

    /// Return the module directory, extracting it from `store` when absent.
    ///
    /// Fails with [`crate::OciError::NotInCache`] when extraction is needed
    /// and the artifact was not preloaded.
    pub fn ensure_extracted(
        &self,
        reference: &OciReference,
        subpath: &str,
        store: &ArtifactStore,
    ) -> OciResult<PathBuf> {
        let module_dir = self.module_dir(reference, subpath);
        if module_dir.exists() {
            debug!("Reusing extracted module at {}", module_dir.display());
            return Ok(module_dir);
        }

        let key = reference.extraction_key();
        let lock = self.key_lock(&key);
        let _guard = lock.lock();

        // Another caller may have finished while we waited.
        if module_dir.exists() {
            return Ok(module_dir);
        }

        let artifact = store.get(reference)?;
        info!(
            reference = %reference,
            subpath = %subpath,
            "Extracting OCI artifact"
        );
        extract_artifact(artifact, subpath, &self.artifact_dir(reference))?;
        self.extracted.lock().insert(format!("{}//{}", key, subpath));

        Ok(module_dir)
    }

    /// Number of extractions performed by this cache instance.
    pub fn extraction_count(&self) -> usize {
        self.extracted.lock().len()
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OciError;
    use crate::extract::tests::build_tar;
    use tempfile::TempDir;

    fn reference() -> OciReference {
        OciReference::parse("oci://reg/repo:v1.0.0").unwrap()
    }

    #[test]
    fn test_missing_artifact_is_not_in_cache() {
        let temp = TempDir::new().unwrap();
        let cache = ExtractionCache::new(temp.path());

        let err = cache
            .ensure_extracted(&reference(), "terraform/x", &ArtifactStore::new())
            .unwrap_err();

        assert!(matches!(err, OciError::NotInCache(_)));
        assert!(err.to_string().contains("not found in cache"));
        assert!(!cache.artifact_dir(&reference()).exists());
    }

    #[test]
    fn test_extracts_once_per_key_and_subpath() {
        let temp = TempDir::new().unwrap();
        let cache = ExtractionCache::new(temp.path());
        let mut store = ArtifactStore::new();
        store.insert(
            reference().cache_key(),
            build_tar(&[("terraform/x/main.tf", b"x"), ("terraform/y/main.tf", b"y")]),
        );

        let first = cache.ensure_extracted(&reference(), "terraform/x", &store).unwrap();
        let second = cache.ensure_extracted(&reference(), "terraform/x", &store).unwrap();

        assert_eq!(first, second);
        assert!(first.join("main.tf").exists());
        assert_eq!(cache.extraction_count(), 1);
    }

    #[test]
    fn test_existing_directory_skips_store() {
        let temp = TempDir::new().unwrap();
        let cache = ExtractionCache::new(temp.path());
        let dir = cache.module_dir(&reference(), "terraform/x");
        std::fs::create_dir_all(&dir).unwrap();

        // Empty store: any lookup would fail.
        let resolved = cache
            .ensure_extracted(&reference(), "terraform/x", &ArtifactStore::new())
            .unwrap();
        assert_eq!(resolved, dir);
        assert_eq!(cache.extraction_count(), 0);
    }
}
