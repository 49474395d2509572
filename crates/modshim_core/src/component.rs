//! Components, module sources and variable metadata.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::value::Value;

const OCI_SCHEME: &str = "oci://";
const DEFAULT_PATH_PREFIX: &str = "terraform";

/// One infrastructure module instance declared by the blueprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Unique, slash-separated key (e.g. `cluster/talos`).
    pub path: String,
    /// Empty for local modules, `oci://...`, a named source, or a remote URL.
    #[serde(default)]
    pub source: String,
    /// Target directory of the generated shim.
    #[serde(default)]
    pub full_path: PathBuf,
    /// Declared variable values.
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    /// Pre-known variable metadata, used when no variable file is read.
    #[serde(default)]
    pub variables: Vec<VariableInfo>,
}

impl Component {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_full_path(mut self, full_path: impl Into<PathBuf>) -> Self {
        self.full_path = full_path.into();
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_variable(mut self, variable: VariableInfo) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn is_local(&self) -> bool {
        self.source.is_empty()
    }
}

/// Metadata of one declared module variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub sensitive: bool,
}

impl VariableInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Copy with the default hidden, for display of sensitive metadata.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.sensitive {
            copy.default = copy.default.map(|_| Value::String("(sensitive)".to_string()));
        }
        copy
    }
}

/// Version selector of a named source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub semver: Option<String>,
}

impl SourceRef {
    /// First non-empty selector, commit winning over tag, branch and semver.
    pub fn selector(&self) -> Option<&str> {
        [&self.commit, &self.tag, &self.branch, &self.semver]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
    }
}

/// A named module source that components may reference by alias.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
    #[serde(default, rename = "ref")]
    pub reference: Option<SourceRef>,
    #[serde(default)]
    pub path_prefix: Option<String>,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.reference.get_or_insert_with(SourceRef::default).tag = Some(tag.into());
        self
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    fn prefix(&self) -> &str {
        self.path_prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PATH_PREFIX)
            .trim_matches('/')
    }
}

/// Where a component's module comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// The component's own directory under the local module root.
    Local,
    /// An OCI artifact: `reference` is `oci://registry/repo:tag` without subpath.
    Oci { reference: String, subpath: String },
    /// Anything the external initializer understands (git, registry, http).
    Remote(String),
}

impl ModuleSource {
    /// Classify a literal source string without alias lookup.
    pub fn classify(source: &str) -> Self {
        if source.is_empty() {
            return ModuleSource::Local;
        }
        if source.starts_with(OCI_SCHEME) {
            let (reference, subpath) = split_subpath(source);
            return ModuleSource::Oci {
                reference: reference.to_string(),
                subpath: subpath.to_string(),
            };
        }
        ModuleSource::Remote(source.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModuleSource::Local => "local",
            ModuleSource::Oci { .. } => "oci",
            ModuleSource::Remote(_) => "remote",
        }
    }
}

/// Split `scheme://host/path//sub/dir?q` into (`scheme://host/path`, `sub/dir?q`).
///
/// The `//` of a scheme separator is never treated as the subpath marker.
pub fn split_subpath(source: &str) -> (&str, &str) {
    let search_from = source.find("://").map(|i| i + 3).unwrap_or(0);
    match source[search_from..].find("//") {
        Some(i) => {
            let at = search_from + i;
            (&source[..at], &source[at + 2..])
        }
        None => (source, ""),
    }
}

/// Named sources from the blueprint, used to resolve component aliases.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Source>,
}

impl SourceRegistry {
    pub fn new(sources: impl IntoIterator<Item = Source>) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Source> {
        self.sources.get(name)
    }

    /// Resolve a component's source, expanding named aliases.
    pub fn resolve(&self, component: &Component) -> ModuleSource {
        if component.is_local() {
            return ModuleSource::Local;
        }
        let Some(source) = self.sources.get(&component.source) else {
            return ModuleSource::classify(&component.source);
        };

        let module_path = format!("{}/{}", source.prefix(), component.path.trim_matches('/'));
        let selector = source.reference.as_ref().and_then(SourceRef::selector);

        if source.url.starts_with(OCI_SCHEME) {
            let (base, _) = split_subpath(&source.url);
            let reference = match selector {
                Some(tag) if !has_tag(base) => format!("{}:{}", base, tag),
                _ => base.to_string(),
            };
            return ModuleSource::Oci {
                reference,
                subpath: module_path,
            };
        }

        let url = source.url.trim_end_matches('/');
        match selector {
            Some(r) => ModuleSource::Remote(format!("{}//{}?ref={}", url, module_path, r)),
            None => ModuleSource::Remote(format!("{}//{}", url, module_path)),
        }
    }
}

fn has_tag(oci_reference: &str) -> bool {
    let path = oci_reference.trim_start_matches(OCI_SCHEME);
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    last_segment.contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sources() {
        assert_eq!(ModuleSource::classify(""), ModuleSource::Local);
        assert_eq!(
            ModuleSource::classify("oci://ghcr.io/org/blueprints:v1.0.0//terraform/cluster"),
            ModuleSource::Oci {
                reference: "oci://ghcr.io/org/blueprints:v1.0.0".to_string(),
                subpath: "terraform/cluster".to_string(),
            }
        );
        assert_eq!(
            ModuleSource::classify("terraform-aws-modules/vpc/aws"),
            ModuleSource::Remote("terraform-aws-modules/vpc/aws".to_string())
        );
    }

    #[test]
    fn test_split_subpath_ignores_scheme() {
        assert_eq!(
            split_subpath("git::https://github.com/a/b.git//modules/x?ref=v1"),
            ("git::https://github.com/a/b.git", "modules/x?ref=v1")
        );
        assert_eq!(split_subpath("oci://reg/repo:v1"), ("oci://reg/repo:v1", ""));
        assert_eq!(split_subpath("./local"), ("./local", ""));
    }

    #[test]
    fn test_resolve_oci_alias_appends_tag() {
        let registry = SourceRegistry::new([
            Source::new("core", "oci://ghcr.io/org/core").with_tag("v0.3.0")
        ]);
        let component = Component::new("network/vpc").with_source("core");

        assert_eq!(
            registry.resolve(&component),
            ModuleSource::Oci {
                reference: "oci://ghcr.io/org/core:v0.3.0".to_string(),
                subpath: "terraform/network/vpc".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_oci_alias_keeps_existing_tag() {
        let registry = SourceRegistry::new([
            Source::new("core", "oci://ghcr.io/org/core:v1").with_tag("v2")
        ]);
        let component = Component::new("dns").with_source("core");

        match registry.resolve(&component) {
            ModuleSource::Oci { reference, .. } => {
                assert_eq!(reference, "oci://ghcr.io/org/core:v1")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resolve_git_alias() {
        let registry = SourceRegistry::new([Source::new(
            "modules",
            "git::https://github.com/org/modules.git",
        )
        .with_tag("v1.2.0")
        .with_path_prefix("infra")]);
        let component = Component::new("cluster/talos").with_source("modules");

        assert_eq!(
            registry.resolve(&component),
            ModuleSource::Remote(
                "git::https://github.com/org/modules.git//infra/cluster/talos?ref=v1.2.0"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_unknown_alias_is_remote() {
        let registry = SourceRegistry::default();
        let component = Component::new("x").with_source("hashicorp/consul/aws");
        assert_eq!(
            registry.resolve(&component),
            ModuleSource::Remote("hashicorp/consul/aws".to_string())
        );
    }

    #[test]
    fn test_empty_source_is_local_even_with_unnamed_alias() {
        let registry = SourceRegistry::new([Source::new("", "oci://ghcr.io/org/core:v1")]);
        assert_eq!(registry.resolve(&Component::new("dns")), ModuleSource::Local);
    }

    #[test]
    fn test_redacted_hides_sensitive_default() {
        let var = VariableInfo::new("token").with_default("s3cr3t").sensitive();
        assert_eq!(
            var.redacted().default,
            Some(Value::String("(sensitive)".to_string()))
        );

        let plain = VariableInfo::new("region").with_default("eu-west-1");
        assert_eq!(plain.redacted(), plain);
    }
}
