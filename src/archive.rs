//! Archive packaging and deploy snapshotting.

use std::fs;
use std::io::Write;
use std::process::Command;

use camino::Utf8Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ArchiveError, KarakuriError};
use crate::revision::walk;

/// Pack a staging directory into a single zip artifact. Entries are written
/// in sorted order with a fixed timestamp, so packing the same tree twice
/// yields the same bytes.
pub(crate) fn pack_dir(dir: &Utf8Path, dest: &Utf8Path) -> Result<(), ArchiveError> {
    let file = fs::File::create(dest)?;
    let mut zip = ZipWriter::new(file);

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for path in walk(dir).map_err(|e| {
        ArchiveError::Io(std::io::Error::other(e.to_string()))
    })? {
        let rel = path.strip_prefix(dir).unwrap_or(&path);
        zip.start_file(rel.as_str(), options)?;
        zip.write_all(&fs::read(&path)?)?;
    }

    zip.finish()?;

    tracing::info!("Packed {} into {}", dir, dest);

    Ok(())
}

/// Snapshot the deploy output with the system git binary: stage everything,
/// commit, push. A clean tree is a no-op.
pub(crate) fn git_snapshot(root: &Utf8Path) -> Result<(), KarakuriError> {
    which::which("git").map_err(|_| KarakuriError::MissingTool("git".into()))?;

    let status = git(root, &["status", "--porcelain"])?;
    if status.is_empty() {
        tracing::info!("Nothing to snapshot in {root}");
        return Ok(());
    }

    git(root, &["add", "-A"])?;
    git(root, &["commit", "-m", "deploy snapshot"])?;
    git(root, &["push"])?;

    Ok(())
}

fn git(root: &Utf8Path, args: &[&str]) -> Result<Vec<u8>, KarakuriError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root.as_str())
        .args(args)
        .output()?;

    if !output.status.success() {
        return Err(KarakuriError::Snapshot(format!(
            "git {} failed:\n{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod test {
    use super::*;

    use std::io::Read;

    use camino::Utf8PathBuf;

    fn fixture() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let staging = root.join("staging");
        fs::create_dir_all(staging.join("css")).unwrap();
        fs::write(staging.join("index.html"), "<html></html>").unwrap();
        fs::write(staging.join("css/app.css"), "body{}").unwrap();

        (dir, root)
    }

    #[test]
    fn test_pack_contains_the_tree() {
        let (_dir, root) = fixture();
        let artifact = root.join("site-en.zip");

        pack_dir(&root.join("staging"), &artifact).unwrap();

        let mut archive = zip::ZipArchive::new(fs::File::open(&artifact).unwrap()).unwrap();
        let names: Vec<_> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();

        assert!(names.contains(&"index.html".to_string()));
        assert!(names.contains(&"css/app.css".to_string()));

        let mut content = String::new();
        archive
            .by_name("css/app.css")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "body{}");
    }

    #[test]
    fn test_pack_is_deterministic() {
        let (_dir, root) = fixture();
        let a = root.join("a.zip");
        let b = root.join("b.zip");

        pack_dir(&root.join("staging"), &a).unwrap();
        pack_dir(&root.join("staging"), &b).unwrap();

        assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap());
    }
}
