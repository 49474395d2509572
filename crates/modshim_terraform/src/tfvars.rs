//! Value-file synthesis.
//!
//! A value file assigns a component's values to its module's variables.
//! Once written it belongs to the user: it is only regenerated when it is
//! missing or an overwrite is requested.
//!
//! Output is deterministic: variables keep declaration order, map keys are
//! sorted at every level.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use modshim_core::{FileSystem, Value, VariableInfo};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{TerraformError, TerraformResult};

const HEADER: &str = "# Managed by modshim\n# Edit freely: this file is not regenerated while it exists.\n";
const SENSITIVE_PLACEHOLDER: &str = "(sensitive)";
const HEREDOC_DELIMITER: &str = "EOT";
const INDENT: &str = "  ";

/// What happened to a value file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFileOutcome {
    Written,
    Kept,
}

/// Writes value files through the filesystem port.
pub struct ValueFileWriter {
    fs: Arc<dyn FileSystem>,
}

impl ValueFileWriter {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Synthesize the value file at `target`.
    ///
    /// Without `overwrite`, an existing readable file is left untouched. An
    /// existing file that cannot be read is an error.
    pub fn synthesize(
        &self,
        target: &Path,
        variables: &[VariableInfo],
        values: &BTreeMap<String, Value>,
        protected: &[String],
        source: &str,
        overwrite: bool,
    ) -> TerraformResult<ValueFileOutcome> {
        if !overwrite && self.fs.exists(target) {
            self.fs
                .read_to_string(target)
                .map_err(|source| TerraformError::UnreadableValueFile {
                    path: target.to_path_buf(),
                    source,
                })?;
            debug!("Keeping existing value file {:?}", target);
            return Ok(ValueFileOutcome::Kept);
        }

        let unknown: Vec<&str> = values
            .keys()
            .filter(|name| !variables.iter().any(|v| &v.name == *name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            warn!(
                "Values without a matching variable are not written to {:?}: {}",
                target,
                unknown.join(", ")
            );
        }

        let content = render_value_file(variables, values, protected, source);
        self.fs
            .write(target, content.as_bytes())
            .map_err(|source| TerraformError::Write {
                path: target.to_path_buf(),
                source,
            })?;
        info!("Wrote value file {:?}", target);
        Ok(ValueFileOutcome::Written)
    }
}

/// Render a complete value file.
pub fn render_value_file(
    variables: &[VariableInfo],
    values: &BTreeMap<String, Value>,
    protected: &[String],
    source: &str,
) -> String {
    let mut out = String::from(HEADER);
    if !source.is_empty() {
        out.push_str(&format!("# Module source: {}\n", source));
    }

    for variable in variables {
        if protected.iter().any(|p| p == &variable.name) {
            continue;
        }

        out.push('\n');
        if let Some(description) = variable.description.as_deref().filter(|d| !d.is_empty()) {
            for line in description.lines() {
                out.push_str(&comment(line));
                out.push('\n');
            }
        }

        let name = &variable.name;
        let line = if variable.sensitive {
            comment(&format!(
                "{} = {}",
                name,
                quote(SENSITIVE_PLACEHOLDER)
            ))
        } else if let Some(value) = values.get(name) {
            assignment(name, value)
        } else if let Some(default) = variable.default.as_ref().filter(|d| !d.is_null()) {
            assignment(name, default)
                .lines()
                .map(comment)
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            comment(&format!("{} = null", name))
        };
        out.push_str(&line);
        out.push('\n');
    }

    out
}

/// `name = value`, possibly spanning several lines.
pub fn assignment(name: &str, value: &Value) -> String {
    format!("{} = {}", name, format_value(value, 0))
}

/// Render a value as an HCL literal. `depth` is the nesting level of the
/// enclosing block, used for indentation of multi-line collections.
pub fn format_value(value: &Value, depth: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::String(s) if s.contains('\n') => heredoc(s),
        Value::String(s) => quote(s),
        Value::List(items) => format_list(items, depth),
        Value::Map(map) => format_map(map, depth),
    }
}

fn format_float(f: f64) -> String {
    if !f.is_finite() {
        return "null".to_string();
    }
    let text = f.to_string();
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{}.0", text)
    }
}

fn format_list(items: &[Value], depth: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }

    let inline = items.iter().all(|item| match item {
        Value::List(_) | Value::Map(_) => false,
        Value::String(s) => !s.contains('\n'),
        _ => true,
    });
    if inline {
        let parts: Vec<String> = items.iter().map(|item| format_value(item, depth)).collect();
        return format!("[{}]", parts.join(", "));
    }

    let pad = INDENT.repeat(depth + 1);
    let mut out = String::from("[\n");
    for item in items {
        out.push_str(&pad);
        out.push_str(&format_value(item, depth + 1));
        out.push_str(",\n");
    }
    out.push_str(&INDENT.repeat(depth));
    out.push(']');
    out
}

fn format_map(map: &BTreeMap<String, Value>, depth: usize) -> String {
    if map.is_empty() {
        return "{}".to_string();
    }

    let pad = INDENT.repeat(depth + 1);
    let mut out = String::from("{\n");
    for (key, value) in map {
        out.push_str(&pad);
        out.push_str(&format_key(key));
        out.push_str(" = ");
        out.push_str(&format_value(value, depth + 1));
        out.push('\n');
    }
    out.push_str(&INDENT.repeat(depth));
    out.push('}');
    out
}

fn format_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Double-quoted HCL string with template sequences escaped.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Heredoc holding `s` line for line, with template sequences escaped.
///
/// The closing delimiter already ends the last line, so one trailing
/// newline of `s` is folded into it. Reading the heredoc back always yields
/// a string ending in a newline: `"a\nb\n"` round-trips exactly, `"a\nb"`
/// comes back as `"a\nb\n"`.
fn heredoc(s: &str) -> String {
    let body = escape_template(s.strip_suffix('\n').unwrap_or(s));

    let mut delimiter = HEREDOC_DELIMITER.to_string();
    while body.split('\n').any(|line| line.trim() == delimiter) {
        delimiter.push('_');
    }

    format!("<<{delim}\n{body}\n{delim}", delim = delimiter, body = body)
}

/// `${` and `%{` start template sequences in heredocs too.
fn escape_template(s: &str) -> String {
    s.replace("${", "$${").replace("%{", "%%{")
}

fn comment(line: &str) -> String {
    format!("# {}", line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modshim_core::MockFileSystem;

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_scalars() {
        assert_eq!(format_value(&Value::Int(42), 0), "42");
        assert_eq!(format_value(&Value::Int(-7), 0), "-7");
        assert_eq!(format_value(&Value::Float(1.5), 0), "1.5");
        assert_eq!(format_value(&Value::Float(2.0), 0), "2.0");
        assert_eq!(format_value(&Value::Bool(false), 0), "false");
        assert_eq!(format_value(&Value::Null, 0), "null");
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(quote("a\\b"), r#""a\\b""#);
        assert_eq!(quote("${var.x}"), r#""$${var.x}""#);
        assert_eq!(quote("%{ if }"), r#""%%{ if }""#);
        assert_eq!(quote("cost $5"), r#""cost $5""#);
        assert_eq!(quote("a\tb"), r#""a\tb""#);
    }

    #[test]
    fn test_multiline_string_heredoc() {
        let value = Value::from("line one\n\n  indented  \nlast\n");
        assert_eq!(
            assignment("script", &value),
            "script = <<EOT\nline one\n\n  indented  \nlast\nEOT"
        );
    }

    /// Parse `name = <value>` back and evaluate it without context.
    fn read_back(value: &Value) -> hcl::Value {
        use hcl::eval::{Context, Evaluate};

        let source = assignment("v", value);
        let body = hcl::parse(&source).unwrap_or_else(|e| panic!("{}\n{}", e, source));
        let attribute = body.attributes().next().unwrap();
        attribute
            .expr()
            .evaluate(&Context::new())
            .unwrap_or_else(|e| panic!("{}\n{}", e, source))
    }

    #[test]
    fn test_heredoc_does_not_interpolate() {
        let value = Value::from("echo ${HOME}\n%{ if x }y%{ endif }\nprice $5\n");
        let rendered = assignment("script", &value);
        assert!(rendered.contains("echo $${HOME}"));
        assert!(rendered.contains("%%{ if x }"));

        assert_eq!(
            read_back(&value),
            hcl::Value::String("echo ${HOME}\n%{ if x }y%{ endif }\nprice $5\n".into())
        );
    }

    #[test]
    fn test_heredoc_inside_collections_reads_back_exactly() {
        let script = "run ${cmd}\nEOT\n%{ raw }\n";
        let value = map(&[
            ("plain", Value::from("${not_a_ref}")),
            ("script", Value::from(script)),
            (
                "steps",
                Value::List(vec![Value::from(script), Value::from("one line")]),
            ),
        ]);

        let rendered = format_value(&value, 0);
        assert!(rendered.contains("<<EOT_"));

        let hcl::Value::Object(object) = read_back(&value) else {
            panic!("expected an object");
        };
        assert_eq!(
            object.get("plain"),
            Some(&hcl::Value::String("${not_a_ref}".into()))
        );
        assert_eq!(object.get("script"), Some(&hcl::Value::String(script.into())));
        assert_eq!(
            object.get("steps"),
            Some(&hcl::Value::Array(vec![
                hcl::Value::String(script.into()),
                hcl::Value::String("one line".into()),
            ]))
        );
    }

    #[test]
    fn test_heredoc_adds_final_newline() {
        assert_eq!(
            read_back(&Value::from("a\nb")),
            hcl::Value::String("a\nb\n".into())
        );
    }

    #[test]
    fn test_heredoc_delimiter_collision() {
        let value = Value::from("a\nEOT\nb");
        assert_eq!(format_value(&value, 0), "<<EOT_\na\nEOT\nb\nEOT_");
    }

    #[test]
    fn test_map_keys_sorted_at_every_level() {
        let value = map(&[
            ("b", Value::Int(1)),
            ("a", map(&[("z", Value::Int(1)), ("y", Value::Int(2))])),
        ]);
        assert_eq!(
            format_value(&value, 0),
            "{\n  a = {\n    y = 2\n    z = 1\n  }\n  b = 1\n}"
        );
    }

    #[test]
    fn test_empty_collections() {
        assert_eq!(format_value(&Value::List(vec![]), 0), "[]");
        assert_eq!(format_value(&Value::Map(BTreeMap::new()), 0), "{}");
        assert_eq!(
            format_value(&map(&[("tags", Value::Map(BTreeMap::new()))]), 0),
            "{\n  tags = {}\n}"
        );
    }

    #[test]
    fn test_non_identifier_keys_are_quoted() {
        let value = map(&[("kubernetes.io/role", Value::from("x")), ("ok_key", Value::Int(1))]);
        assert_eq!(
            format_value(&value, 0),
            "{\n  \"kubernetes.io/role\" = \"x\"\n  ok_key = 1\n}"
        );
    }

    #[test]
    fn test_lists() {
        assert_eq!(
            format_value(&Value::from(vec!["a", "b"]), 0),
            r#"["a", "b"]"#
        );
        let nested = Value::List(vec![map(&[("name", Value::from("n1"))])]);
        assert_eq!(
            format_value(&nested, 0),
            "[\n  {\n    name = \"n1\"\n  },\n]"
        );
    }

    #[test]
    fn test_render_value_file() {
        let variables = vec![
            VariableInfo::new("cluster_name").with_description("Cluster name"),
            VariableInfo::new("replicas").with_default(3),
            VariableInfo::new("token").sensitive().with_default("hunter2"),
            VariableInfo::new("unset"),
            VariableInfo::new("context_path"),
        ];
        let mut values = BTreeMap::new();
        values.insert("cluster_name".to_string(), Value::from("prod"));
        values.insert("token".to_string(), Value::from("hunter3"));
        let protected = vec!["context_path".to_string()];

        let content = render_value_file(&variables, &values, &protected, "oci://r/m:v1//x");

        assert_eq!(
            content,
            "# Managed by modshim\n\
             # Edit freely: this file is not regenerated while it exists.\n\
             # Module source: oci://r/m:v1//x\n\
             \n\
             # Cluster name\n\
             cluster_name = \"prod\"\n\
             \n\
             # replicas = 3\n\
             \n\
             # token = \"(sensitive)\"\n\
             \n\
             # unset = null\n"
        );
        assert!(!content.contains("hunter"));
    }

    #[test]
    fn test_commented_default_prefixes_every_line() {
        let variables = vec![VariableInfo::new("tags").with_default(map(&[
            ("env", Value::from("dev")),
            ("team", Value::from("infra")),
        ]))];
        let content = render_value_file(&variables, &BTreeMap::new(), &[], "");
        assert!(content.ends_with("\n# tags = {\n#   env = \"dev\"\n#   team = \"infra\"\n# }\n"));
        assert!(!content.contains("Module source"));
    }

    #[test]
    fn test_existing_file_is_kept_without_writing() {
        let mut fs = MockFileSystem::new();
        fs.expect_exists().returning(|_| true);
        fs.expect_read_to_string()
            .returning(|_| Ok("# user edits\n".to_string()));
        fs.expect_write().never();

        let writer = ValueFileWriter::new(Arc::new(fs));
        let outcome = writer
            .synthesize(
                Path::new("contexts/local/terraform/a.tfvars"),
                &[VariableInfo::new("x")],
                &BTreeMap::new(),
                &[],
                "",
                false,
            )
            .unwrap();
        assert_eq!(outcome, ValueFileOutcome::Kept);
    }

    #[test]
    fn test_unreadable_existing_file_is_fatal() {
        let mut fs = MockFileSystem::new();
        fs.expect_exists().returning(|_| true);
        fs.expect_read_to_string().returning(|_| {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "denied",
            ))
        });
        fs.expect_write().never();

        let writer = ValueFileWriter::new(Arc::new(fs));
        let err = writer
            .synthesize(Path::new("v.tfvars"), &[], &BTreeMap::new(), &[], "", false)
            .unwrap_err();
        assert!(matches!(err, TerraformError::UnreadableValueFile { .. }));
        assert!(err.to_string().contains("v.tfvars"));
    }

    #[test]
    fn test_overwrite_skips_existence_check() {
        let mut fs = MockFileSystem::new();
        fs.expect_exists().never();
        fs.expect_write().times(1).returning(|_, _| Ok(()));

        let writer = ValueFileWriter::new(Arc::new(fs));
        let outcome = writer
            .synthesize(Path::new("v.tfvars"), &[], &BTreeMap::new(), &[], "", true)
            .unwrap();
        assert_eq!(outcome, ValueFileOutcome::Written);
    }
}
