//! Command configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single external command invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory (inherits the caller's when unset)
    pub workdir: Option<PathBuf>,
    /// Environment variables added to the child process only
    pub env: BTreeMap<String, String>,
    /// Timeout in seconds (0 = no timeout)
    pub timeout_seconds: u64,
    /// Forward output lines while the command runs
    pub stream_output: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn stream_output(mut self) -> Self {
        self.stream_output = true;
        self
    }

    /// Render the command line for logs.
    pub fn display(&self) -> String {
        let mut cmd = self.program.clone();
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('=') {
                cmd.push_str(&format!(" '{}'", arg));
            } else {
                cmd.push_str(&format!(" {}", arg));
            }
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_display() {
        let spec = CommandSpec::new("terraform")
            .args(["init", "-backend=false"])
            .arg("-json")
            .env("TF_DATA_DIR", "/state")
            .timeout(30);

        assert_eq!(spec.display(), "terraform init '-backend=false' -json");
        assert_eq!(spec.env.get("TF_DATA_DIR").map(String::as_str), Some("/state"));
        assert_eq!(spec.timeout_seconds, 30);
        assert!(spec.workdir.is_none());
    }
}
