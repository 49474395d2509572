//! Per-component module resolution.
//!
//! Each component walks a small state machine:
//!
//! ```text
//! Unresolved ─┬─ source empty ──────────────> LocalNoOp ──────────┐
//!             ├─ OCI (literal or alias) ────> OciResolving ───────┤
//!             └─ anything else ─────────────> ExternalInit ───────┴─> Resolved
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use modshim_core::{Component, FileSystem, ModuleSource, ProjectLayout, SourceRegistry};
use modshim_oci::{ArtifactStore, ExtractionCache, OciReference};
use modshim_runner::CommandRunner;
use serde::Serialize;
use tracing::debug;

use crate::error::TerraformResult;
use crate::init::ModuleInitializer;
use crate::shim::relative_source;

/// How a component's module was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Local,
    Oci,
    Remote,
}

/// Outcome of resolving one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub kind: ModuleKind,
    /// Directory holding the module's source files.
    pub module_dir: PathBuf,
    /// Where the shim goes. `None` for local modules, which get no shim.
    pub shim_dir: Option<PathBuf>,
    /// `source` of the shim's module block.
    pub shim_source: String,
}

/// Resolution progress of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved,
    LocalNoOp,
    OciResolving {
        reference: OciReference,
        subpath: String,
    },
    ExternalInit {
        source: String,
    },
    Resolved(ResolvedModule),
}

/// Resolves components to module directories.
pub struct ModuleResolver {
    layout: ProjectLayout,
    sources: SourceRegistry,
    store: ArtifactStore,
    cache: ExtractionCache,
    initializer: ModuleInitializer,
}

impl ModuleResolver {
    pub fn new(
        layout: ProjectLayout,
        sources: SourceRegistry,
        store: ArtifactStore,
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let cache = ExtractionCache::new(layout.extraction_root());
        let initializer =
            ModuleInitializer::new(runner, fs, layout.config().terraform_binary.clone())
                .with_timeout(layout.config().init_timeout_seconds);
        Self {
            layout,
            sources,
            store,
            cache,
            initializer,
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Run the state machine for `component` until it is resolved.
    pub async fn resolve(&self, component: &Component) -> TerraformResult<ResolvedModule> {
        let mut state = ResolutionState::Unresolved;
        loop {
            state = match state {
                ResolutionState::Resolved(module) => return Ok(module),
                current => {
                    let next = self.step(component, current).await?;
                    debug!(component = %component.path, "-> {:?}", next);
                    next
                }
            };
        }
    }

    /// Advance one transition.
    pub async fn step(
        &self,
        component: &Component,
        state: ResolutionState,
    ) -> TerraformResult<ResolutionState> {
        let next = match state {
            ResolutionState::Unresolved => match self.classify(component) {
                ModuleSource::Local => ResolutionState::LocalNoOp,
                ModuleSource::Oci { reference, subpath } => ResolutionState::OciResolving {
                    reference: OciReference::parse(&reference)?,
                    subpath: subpath.trim_matches('/').to_string(),
                },
                ModuleSource::Remote(source) => ResolutionState::ExternalInit { source },
            },

            ResolutionState::LocalNoOp => ResolutionState::Resolved(ResolvedModule {
                kind: ModuleKind::Local,
                module_dir: self.layout.local_module_dir(&component.path),
                shim_dir: None,
                shim_source: String::new(),
            }),

            ResolutionState::OciResolving { reference, subpath } => {
                let module_dir = self.cache.ensure_extracted(&reference, &subpath, &self.store)?;
                let shim_dir = self.shim_dir(component);
                let shim_source = relative_source(&shim_dir, &module_dir);
                ResolutionState::Resolved(ResolvedModule {
                    kind: ModuleKind::Oci,
                    module_dir,
                    shim_dir: Some(shim_dir),
                    shim_source,
                })
            }

            ResolutionState::ExternalInit { source } => {
                let shim_dir = self.shim_dir(component);
                let state_dir = self.layout.init_state_dir(&component.path);
                let module_dir = self
                    .initializer
                    .initialize(&source, &shim_dir, &state_dir)
                    .await?;
                ResolutionState::Resolved(ResolvedModule {
                    kind: ModuleKind::Remote,
                    module_dir,
                    shim_dir: Some(shim_dir),
                    shim_source: source,
                })
            }

            resolved @ ResolutionState::Resolved(_) => resolved,
        };
        Ok(next)
    }

    fn classify(&self, component: &Component) -> ModuleSource {
        let source = self.sources.resolve(component);
        debug!(component = %component.path, kind = source.kind(), "Classified module source");
        source
    }

    /// Artifacts extracted by this resolver so far.
    pub fn extraction_count(&self) -> usize {
        self.cache.extraction_count()
    }

    /// A declared relative shim directory is taken from the project root.
    fn shim_dir(&self, component: &Component) -> PathBuf {
        if component.full_path.as_os_str().is_empty() {
            self.layout.shim_dir(&component.path)
        } else if component.full_path.is_relative() {
            self.layout.root().join(&component.full_path)
        } else {
            component.full_path.clone()
        }
    }
}
