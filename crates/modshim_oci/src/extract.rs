//! Selective tar extraction of artifact layers.
//!
//! Only entries under the requested subpath are written. The archive is
//! walked twice: the first pass validates every matching entry name, the
//! second writes files. A single unsafe name therefore aborts extraction
//! before anything touches the disk.

use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Component as PathComponent, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::{debug, warn};

use crate::error::{OciError, OciResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Validate a raw tar entry name and return its cleaned relative form.
///
/// `.` and empty segments are dropped; a `..` segment or an absolute path is
/// rejected, even when the `..` would cancel out lexically.
pub fn clean_entry_path(raw: &str) -> OciResult<PathBuf> {
    let traversal = || OciError::PathTraversal {
        entry: raw.to_string(),
    };

    if raw.starts_with('/') || raw.starts_with('\\') || Path::new(raw).is_absolute() {
        return Err(traversal());
    }

    let mut cleaned = PathBuf::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(traversal()),
            s if s.contains(':') && cfg!(windows) => return Err(traversal()),
            s => cleaned.push(s),
        }
    }

    // Reject anything `PathBuf` itself would treat as non-normal.
    if cleaned
        .components()
        .any(|c| !matches!(c, PathComponent::Normal(_)))
    {
        return Err(traversal());
    }

    Ok(cleaned)
}

/// Extract every entry of `artifact` under `subpath` into `dest_dir`.
///
/// Entries keep their full archive path, so the module ends up at
/// `dest_dir/subpath`. Gzip-compressed layers are detected and decompressed.
pub fn extract_artifact(artifact: &[u8], subpath: &str, dest_dir: &Path) -> OciResult<()> {
    let subpath = subpath.trim_matches('/');

    let matched = validate_entries(artifact, subpath, dest_dir)?;
    if matched == 0 {
        warn!(
            subpath = %subpath,
            "No artifact entries under subpath"
        );
        return Ok(());
    }

    fs::create_dir_all(dest_dir).map_err(|e| extraction_error(dest_dir, e))?;

    let mut archive = Archive::new(open_layer(artifact));
    let entries = archive
        .entries()
        .map_err(|e| extraction_error(dest_dir, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| extraction_error(dest_dir, e))?;
        let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        if !matches_subpath(&raw, subpath) {
            continue;
        }

        let cleaned = clean_entry_path(&raw)?;
        if cleaned.as_os_str().is_empty() {
            continue;
        }
        let target = dest_dir.join(&cleaned);
        if !target.starts_with(dest_dir) {
            return Err(OciError::PathTraversal { entry: raw });
        }

        let entry_type = entry.header().entry_type();
        match entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(|e| extraction_error(&target, e))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| extraction_error(parent, e))?;
                }
                let mut file = File::create(&target).map_err(|e| extraction_error(&target, e))?;
                io::copy(&mut entry, &mut file).map_err(|e| extraction_error(&target, e))?;

                let mode = entry.header().mode().unwrap_or(0o644);
                set_mode(&target, file_mode(&cleaned, mode))
                    .map_err(|e| extraction_error(&target, e))?;
                debug!("Extracted {:?}", cleaned);
            }
            other => {
                debug!("Skipping {:?} entry {}", other, raw);
            }
        }
    }

    Ok(())
}

/// First pass: every entry under `subpath` must have a safe name.
fn validate_entries(artifact: &[u8], subpath: &str, dest_dir: &Path) -> OciResult<usize> {
    let mut archive = Archive::new(open_layer(artifact));
    let entries = archive
        .entries()
        .map_err(|e| extraction_error(dest_dir, e))?;

    let mut matched = 0;
    for entry in entries {
        let entry = entry.map_err(|e| extraction_error(dest_dir, e))?;
        let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        if matches_subpath(&raw, subpath) {
            clean_entry_path(&raw)?;
            matched += 1;
        }
    }
    Ok(matched)
}

fn matches_subpath(raw: &str, subpath: &str) -> bool {
    if subpath.is_empty() {
        return true;
    }
    let name = raw.trim_start_matches("./");
    name.strip_prefix(subpath)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn open_layer(artifact: &[u8]) -> Box<dyn Read + '_> {
    if artifact.starts_with(&GZIP_MAGIC) {
        Box::new(GzDecoder::new(Cursor::new(artifact)))
    } else {
        Box::new(Cursor::new(artifact))
    }
}

/// Permission bits from the header, with execute forced on for shell scripts.
fn file_mode(path: &Path, header_mode: u32) -> u32 {
    let mode = header_mode & 0o777;
    if path.extension().is_some_and(|ext| ext == "sh") {
        mode | 0o111
    } else {
        mode
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

fn extraction_error(path: &Path, err: io::Error) -> OciError {
    OciError::Extraction {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clean_entry_path() {
        assert_eq!(
            clean_entry_path("./terraform//mod/./main.tf").unwrap(),
            PathBuf::from("terraform/mod/main.tf")
        );
        assert!(clean_entry_path("../etc/passwd").is_err());
        assert!(clean_entry_path("terraform/mod/../../etc/passwd").is_err());
        assert!(clean_entry_path("/etc/passwd").is_err());
        assert!(clean_entry_path("terraform\\..\\..\\x").is_err());
        assert_eq!(clean_entry_path("./").unwrap(), PathBuf::new());
    }

    #[test]
    fn test_matches_subpath_on_segment_boundary() {
        assert!(matches_subpath("terraform/mod/main.tf", "terraform/mod"));
        assert!(matches_subpath("./terraform/mod/main.tf", "terraform/mod"));
        assert!(matches_subpath("terraform/mod", "terraform/mod"));
        assert!(!matches_subpath("terraform/module/main.tf", "terraform/mod"));
        assert!(matches_subpath("anything", ""));
    }

    #[test]
    fn test_file_mode() {
        assert_eq!(file_mode(Path::new("a/run.sh"), 0o644), 0o755);
        assert_eq!(file_mode(Path::new("a/main.tf"), 0o100644), 0o644);
    }

    #[test]
    fn test_extract_selects_subpath() {
        let temp = TempDir::new().unwrap();
        let artifact = build_tar(&[
            ("terraform/a/main.tf", b"a"),
            ("terraform/b/main.tf", b"b"),
            ("README.md", b"readme"),
        ]);

        extract_artifact(&artifact, "terraform/a", temp.path()).unwrap();

        assert_eq!(
            fs::read_to_string(temp.path().join("terraform/a/main.tf")).unwrap(),
            "a"
        );
        assert!(!temp.path().join("terraform/b").exists());
        assert!(!temp.path().join("README.md").exists());
    }

    #[test]
    fn test_extract_gzip_layer() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let temp = TempDir::new().unwrap();
        let tar = build_tar(&[("terraform/a/variables.tf", b"variable \"x\" {}")]);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar).unwrap();
        let gz = encoder.finish().unwrap();

        extract_artifact(&gz, "terraform/a", temp.path()).unwrap();
        assert!(temp.path().join("terraform/a/variables.tf").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_marks_shell_scripts_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let artifact = build_tar(&[("terraform/a/hook.sh", b"#!/bin/sh\n")]);
        extract_artifact(&artifact, "terraform/a", temp.path()).unwrap();

        let mode = fs::metadata(temp.path().join("terraform/a/hook.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    // Builds an uncompressed tar. Names go straight into the header so
    // adversarial names survive (`Builder::append_data` would reject them).
    pub(crate) fn build_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(EntryType::Regular);
            header.set_cksum();
            builder.append(&header, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }
}
