//! # modshim_oci
//!
//! OCI-distributed module artifacts for modshim.
//!
//! Components may point at `oci://registry/repo:tag//subpath`. Every distinct
//! artifact is pulled once per run ([`ArtifactStore::preload`]), then the
//! requested subpath is extracted into a content-addressed directory that
//! later runs reuse ([`ExtractionCache`]).
//!
//! ## Safety
//!
//! Archive entries are validated before anything is written: an absolute
//! path or a `..` segment anywhere in a matching entry fails the whole
//! extraction.
//!
//! ## Example
//!
//! ```rust,no_run
//! use modshim_oci::{ArtifactStore, ExtractionCache, OciReference, RegistryPuller};
//!
//! # async fn example() -> modshim_oci::OciResult<()> {
//! let puller = RegistryPuller::from_env();
//! let refs = vec!["oci://ghcr.io/org/blueprints:v1.0.0".to_string()];
//! let store = ArtifactStore::preload(&puller, &refs).await?;
//!
//! let cache = ExtractionCache::new(".modshim/.oci_extracted");
//! let reference = OciReference::parse("oci://ghcr.io/org/blueprints:v1.0.0")?;
//! let module_dir = cache.ensure_extracted(&reference, "terraform/cluster", &store)?;
//! println!("module at {}", module_dir.display());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod extract;
pub mod preload;
pub mod puller;
pub mod reference;

pub use cache::ExtractionCache;
pub use error::{OciError, OciResult};
pub use extract::{clean_entry_path, extract_artifact};
pub use preload::{collect_references, ArtifactStore};
pub use puller::{ArtifactPuller, RegistryCredentials, RegistryPuller, StaticPuller};
pub use reference::OciReference;
