use std::fs;
use std::time::Instant;

use camino::Utf8Path;

use crate::utils::as_overhead;

/// Filesystem collaborator injected into the orchestrator. The task graph
/// itself never calls `std::fs` for tree-level operations directly, so tests
/// can observe or stub them.
pub trait Workspace: Send + Sync {
    /// Delete the tree at `path` if it exists and recreate it empty.
    fn clear_tree(&self, path: &Utf8Path) -> std::io::Result<()>;

    /// Recursively copy `src` into `dst`, creating directories as needed.
    fn copy_tree(&self, src: &Utf8Path, dst: &Utf8Path) -> std::io::Result<()>;
}

/// The real filesystem implementation.
pub struct FsWorkspace;

impl Workspace for FsWorkspace {
    fn clear_tree(&self, path: &Utf8Path) -> std::io::Result<()> {
        let s = Instant::now();

        if fs::metadata(path).is_ok() {
            fs::remove_dir_all(path)?;
        }

        fs::create_dir_all(path)?;

        tracing::info!("Cleared {} {}", path, as_overhead(s));

        Ok(())
    }

    fn copy_tree(&self, src: &Utf8Path, dst: &Utf8Path) -> std::io::Result<()> {
        copy_rec(src.as_std_path(), dst.as_std_path())
    }
}

fn copy_rec(src: &std::path::Path, dst: &std::path::Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let filetype = entry.file_type()?;
        if filetype.is_dir() {
            copy_rec(&entry.path(), &dst.join(entry.file_name()))?;
        } else {
            fs::copy(entry.path(), dst.join(entry.file_name()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    use camino::Utf8PathBuf;

    #[test]
    fn test_clear_tree_recreates_empty() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let target = root.join("out");

        fs::create_dir_all(target.join("nested")).unwrap();
        fs::write(target.join("nested/file.txt"), "stale").unwrap();

        FsWorkspace.clear_tree(&target).unwrap();

        assert!(target.is_dir());
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }

    #[test]
    fn test_copy_tree_preserves_structure() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        fs::create_dir_all(root.join("a/sub")).unwrap();
        fs::write(root.join("a/top.txt"), "top").unwrap();
        fs::write(root.join("a/sub/leaf.txt"), "leaf").unwrap();

        FsWorkspace
            .copy_tree(&root.join("a"), &root.join("b"))
            .unwrap();

        assert_eq!(fs::read_to_string(root.join("b/top.txt")).unwrap(), "top");
        assert_eq!(
            fs::read_to_string(root.join("b/sub/leaf.txt")).unwrap(),
            "leaf"
        );
    }
}
