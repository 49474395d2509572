//! The generation pipeline.
//!
//! For every component, in blueprint order: resolve the module, write the
//! shim (non-local components only), read the variable declarations, merge
//! template overrides into the declared values and synthesize the value
//! file. The first failing component aborts the run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use modshim_core::{
    Component, FileSystem, ModuleSource, ProjectLayout, SourceRegistry, Value, VariableInfo,
};
use modshim_oci::{collect_references, ArtifactPuller, ArtifactStore};
use modshim_runner::CommandRunner;
use modshim_templates::{load_overrides, Overrides};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{TerraformError, TerraformResult};
use crate::resolver::{ModuleKind, ModuleResolver, ResolvedModule};
use crate::shim::ShimGenerator;
use crate::tfvars::{ValueFileOutcome, ValueFileWriter};
use crate::variables::{parse_variables, VARIABLES_FILE};

/// Options for one generation run.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Regenerate value files that already exist.
    pub overwrite: bool,
}

impl GenerateOptions {
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Result for one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub path: String,
    pub kind: ModuleKind,
    pub module_dir: PathBuf,
    pub shim_written: bool,
    pub value_file: PathBuf,
    pub value_file_outcome: ValueFileOutcome,
    pub variables: usize,
}

/// Summary of a generation run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub run_id: Uuid,
    pub context: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub components: Vec<ComponentReport>,
    /// Module extractions performed by this run; zero when every module was
    /// already on disk.
    pub extractions: usize,
}

impl GenerationReport {
    pub fn written(&self) -> usize {
        self.components
            .iter()
            .filter(|c| c.value_file_outcome == ValueFileOutcome::Written)
            .count()
    }

    pub fn kept(&self) -> usize {
        self.components.len() - self.written()
    }
}

/// Drives generation for a project.
pub struct Generator {
    layout: ProjectLayout,
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn CommandRunner>,
    puller: Arc<dyn ArtifactPuller>,
}

impl Generator {
    pub fn new(
        layout: ProjectLayout,
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn CommandRunner>,
        puller: Arc<dyn ArtifactPuller>,
    ) -> Self {
        Self {
            layout,
            fs,
            runner,
            puller,
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Pull every OCI artifact the components need, each exactly once.
    pub async fn preload(
        &self,
        components: &[Component],
        sources: &SourceRegistry,
    ) -> TerraformResult<ArtifactStore> {
        let references = collect_references(components, sources)?;
        Ok(ArtifactStore::preload(self.puller.as_ref(), &references).await?)
    }

    /// Preload artifacts and extract the module of every OCI component.
    ///
    /// Nothing else is resolved and no file outside the extraction cache is
    /// written.
    pub async fn prefetch(
        &self,
        components: &[Component],
        sources: &SourceRegistry,
    ) -> TerraformResult<Vec<(String, ResolvedModule)>> {
        let store = self.preload(components, sources).await?;
        let resolver = self.resolver(sources, store);

        let mut extracted = Vec::new();
        for component in components {
            if !matches!(sources.resolve(component), ModuleSource::Oci { .. }) {
                continue;
            }
            let module = resolver
                .resolve(component)
                .await
                .map_err(|e| TerraformError::for_component(&component.path, e))?;
            extracted.push((component.path.clone(), module));
        }
        info!(
            "Prefetched {} OCI module(s), {} newly extracted",
            extracted.len(),
            resolver.extraction_count()
        );
        Ok(extracted)
    }

    /// Run the whole pipeline.
    pub async fn generate(
        &self,
        components: &[Component],
        sources: &SourceRegistry,
        options: &GenerateOptions,
    ) -> TerraformResult<GenerationReport> {
        let store = self.preload(components, sources).await?;
        self.generate_with_store(components, sources, store, options)
            .await
    }

    /// Run the pipeline against already preloaded artifacts.
    pub async fn generate_with_store(
        &self,
        components: &[Component],
        sources: &SourceRegistry,
        store: ArtifactStore,
        options: &GenerateOptions,
    ) -> TerraformResult<GenerationReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            context = %self.layout.context_name(),
            "Generating {} component(s)",
            components.len()
        );

        let overrides = load_overrides(
            self.layout.templates_root(),
            self.layout.context_name(),
            self.layout.load_context_values()?,
        )?;

        let resolver = self.resolver(sources, store);
        let shims = ShimGenerator::new(self.fs.clone());
        let writer = ValueFileWriter::new(self.fs.clone());

        let mut reports = Vec::with_capacity(components.len());
        for component in components {
            let report = self
                .generate_component(component, &resolver, &shims, &writer, &overrides, options)
                .await
                .map_err(|e| TerraformError::for_component(&component.path, e))?;
            reports.push(report);
        }

        let report = GenerationReport {
            run_id,
            context: self.layout.context_name().to_string(),
            started_at,
            finished_at: Utc::now(),
            components: reports,
            extractions: resolver.extraction_count(),
        };
        info!(
            run_id = %run_id,
            extractions = report.extractions,
            "Generation finished: {} written, {} kept",
            report.written(),
            report.kept()
        );
        Ok(report)
    }

    async fn generate_component(
        &self,
        component: &Component,
        resolver: &ModuleResolver,
        shims: &ShimGenerator,
        writer: &ValueFileWriter,
        overrides: &Overrides,
        options: &GenerateOptions,
    ) -> TerraformResult<ComponentReport> {
        info!(component = %component.path, "Processing component");
        let resolved = resolver.resolve(component).await?;

        let shim_written = match &resolved.shim_dir {
            Some(shim_dir) => {
                shims.generate(shim_dir, &resolved.module_dir, &resolved.shim_source)?;
                true
            }
            None => false,
        };

        let variables = self.variables(component, &resolved)?;
        let values = merge_values(&component.values, overrides.get(&component.path));

        let value_file = self.layout.value_file(&component.path);
        let outcome = writer.synthesize(
            &value_file,
            &variables,
            &values,
            &self.layout.config().protected_variables,
            &component.source,
            options.overwrite,
        )?;

        Ok(ComponentReport {
            path: component.path.clone(),
            kind: resolved.kind,
            module_dir: resolved.module_dir,
            shim_written,
            value_file,
            value_file_outcome: outcome,
            variables: variables.len(),
        })
    }

    /// Variable metadata for a resolved component.
    ///
    /// Local components fall back to their declared variables when the
    /// module directory has no variable file.
    fn variables(
        &self,
        component: &Component,
        resolved: &ResolvedModule,
    ) -> TerraformResult<Vec<VariableInfo>> {
        let protected = &self.layout.config().protected_variables;
        let path = resolved.module_dir.join(VARIABLES_FILE);

        if resolved.kind == ModuleKind::Local && !self.fs.exists(&path) {
            debug!(
                component = %component.path,
                "No variable file, using {} declared variable(s)",
                component.variables.len()
            );
            return Ok(component
                .variables
                .iter()
                .filter(|v| !protected.contains(&v.name))
                .cloned()
                .collect());
        }

        parse_variables(self.fs.as_ref(), &path, protected)
    }

    fn resolver(&self, sources: &SourceRegistry, store: ArtifactStore) -> ModuleResolver {
        ModuleResolver::new(
            self.layout.clone(),
            sources.clone(),
            store,
            self.fs.clone(),
            self.runner.clone(),
        )
    }
}

/// Component values with template overrides applied on top, key by key.
pub fn merge_values(
    declared: &BTreeMap<String, Value>,
    overrides: Option<&BTreeMap<String, Value>>,
) -> BTreeMap<String, Value> {
    let mut merged = declared.clone();
    if let Some(overrides) = overrides {
        for (name, value) in overrides {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}
