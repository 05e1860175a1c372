//! Filename sanitizing and directory bootstrap shared by server and client

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, TransferError};

/// Reduce a client-supplied name to its final normal component.
///
/// `../../etc/passwd`, `/etc/passwd` and `passwd` all become `passwd`.
/// Returns `None` when nothing usable remains (`..`, `/`, `.`), or the name
/// holds a NUL byte.
pub fn base_name(raw: &str) -> Option<String> {
    if raw.contains('\0') {
        return None;
    }
    // Treat both separators alike so a Windows-style path from the wire is
    // stripped on every platform
    let unified = raw.replace('\\', "/");
    match Path::new(&unified).components().next_back()? {
        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
        _ => None,
    }
}

/// Sanitize `raw` and join it under `root`.
pub fn resolve_in_root(root: &Path, raw: &str) -> Result<(String, PathBuf)> {
    let name = base_name(raw)
        .ok_or_else(|| TransferError::Validation(format!("invalid filename '{}'", raw)))?;
    let path = root.join(&name);
    Ok((name, path))
}

/// Create directory with parent creation
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_base_name_strips_traversal() {
        assert_eq!(base_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(base_name("/etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(base_name("passwd").as_deref(), Some("passwd"));
        assert_eq!(base_name("dir\\..\\secret.txt").as_deref(), Some("secret.txt"));
        assert_eq!(base_name("./notes.md").as_deref(), Some("notes.md"));
        assert_eq!(base_name("with space.txt").as_deref(), Some("with space.txt"));
    }

    #[test]
    fn test_base_name_rejects_empty_components() {
        assert_eq!(base_name(".."), None);
        assert_eq!(base_name("/"), None);
        assert_eq!(base_name("."), None);
        assert_eq!(base_name(""), None);
        assert_eq!(base_name("a/.."), None);
        assert_eq!(base_name("file\0.txt"), None);
    }

    #[test]
    fn test_resolve_in_root_stays_under_root() {
        let tmp = TempDir::new().unwrap();
        let (name, path) = resolve_in_root(tmp.path(), "../../etc/passwd").unwrap();
        assert_eq!(name, "passwd");
        assert_eq!(path, tmp.path().join("passwd"));
        assert!(matches!(
            resolve_in_root(tmp.path(), ".."),
            Err(TransferError::Validation(_))
        ));
    }

    #[test]
    fn test_ensure_dir_exists() {
        let tmp = TempDir::new().unwrap();
        let new_dir = tmp.path().join("new").join("nested");
        ensure_dir_exists(&new_dir).unwrap();
        assert!(new_dir.is_dir());
        // Should be idempotent
        ensure_dir_exists(&new_dir).unwrap();
    }
}
