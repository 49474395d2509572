//! OCI artifact reference parsing.
//!
//! Parses `oci://registry/repository:tag` into its three parts. Unlike image
//! references there are no defaults: registry, repository and tag must all be
//! spelled out.

use crate::error::{OciError, OciResult};

const OCI_SCHEME: &str = "oci://";

/// Parsed OCI artifact reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OciReference {
    /// Registry hostname (e.g. "ghcr.io")
    pub registry: String,
    /// Repository path (e.g. "org/blueprints")
    pub repository: String,
    /// Tag (e.g. "v1.0.0")
    pub tag: String,
}

impl OciReference {
    /// Parse an `oci://registry/repository:tag` string.
    ///
    /// Fails when the scheme is missing, when there is not exactly one `:`
    /// separating the tag, or when no `/` separates registry and repository.
    pub fn parse(reference: &str) -> OciResult<Self> {
        let invalid = |message: &str| OciError::InvalidReference {
            reference: reference.to_string(),
            message: message.to_string(),
        };

        let rest = reference
            .strip_prefix(OCI_SCHEME)
            .ok_or_else(|| invalid("missing oci:// prefix"))?;

        let parts: Vec<&str> = rest.split(':').collect();
        if parts.len() != 2 {
            return Err(invalid("expected registry/repository:tag"));
        }
        let (name, tag) = (parts[0], parts[1]);

        let (registry, repository) = name
            .split_once('/')
            .ok_or_else(|| invalid("expected registry/repository:tag"))?;

        if registry.is_empty() || repository.is_empty() || tag.is_empty() {
            return Err(invalid("registry, repository and tag must not be empty"));
        }
        if tag.contains('/') {
            return Err(invalid("tag must not contain '/'"));
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Key under which the artifact bytes are cached: `registry/repository:tag`.
    pub fn cache_key(&self) -> String {
        format!("{}/{}:{}", self.registry, self.repository, self.tag)
    }

    /// Directory name of the extracted artifact: `registry@repository@tag`.
    ///
    /// Stable across runs and distinct for distinct references. `/` becomes
    /// `+`; any byte outside `[A-Za-z0-9._-]` is written as `%XX`, so the `@`
    /// separators and `+` never occur inside a part.
    pub fn extraction_key(&self) -> String {
        format!(
            "{}@{}@{}",
            escape_key_part(&self.registry),
            escape_key_part(&self.repository),
            escape_key_part(&self.tag)
        )
    }
}

fn escape_key_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for byte in part.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(byte as char),
            b'/' => out.push('+'),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

impl std::fmt::Display for OciReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", OCI_SCHEME, self.cache_key())
    }
}
