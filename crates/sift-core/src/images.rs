//! Discovering image files under a user-chosen directory and turning them into records.
//!
//! The image root is chosen by the user; we read it and only ever delete on confirmation.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use walkdir::WalkDir;

use crate::llm::Captioner;
use crate::records::ImageRecord;

/// Scans `root` for files with one of `extensions` and returns their absolute paths in
/// traversal order. Does not follow symlinks (walkdir default). Files whose content is not
/// the image format their extension claims are skipped.
pub fn scan_images(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    // Paths are record keys; the watcher reports canonical paths too.
    let root = root
        .canonicalize()
        .map_err(|e| ScanError::Canonicalize(root.to_path_buf(), e))?;
    let root = root.as_path();
    let mut images = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_image_extension(entry.path(), extensions) {
            continue;
        }
        if !signature_matches(entry.path()) {
            tracing::debug!(path = %entry.path().display(), "content is not the claimed image format");
            continue;
        }
        images.push(entry.path().to_path_buf());
    }
    Ok(images)
}

/// Case-insensitive extension check against a list like `["png", "jpg"]`.
pub fn has_image_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions.iter().any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Sniffs the leading bytes. Extensions `image` doesn't know are accepted as-is.
fn signature_matches(path: &Path) -> bool {
    let Some(expected) = path
        .extension()
        .and_then(image::ImageFormat::from_extension)
    else {
        return true;
    };
    let mut header = [0u8; 32];
    let read = match File::open(path).and_then(|mut f| f.read(&mut header)) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read header");
            return false;
        }
    };
    matches!(image::guess_format(&header[..read]), Ok(found) if found == expected)
}

/// Reads file metadata and asks `captioner` for a caption.
/// A failed caption is logged and leaves the caption empty.
pub async fn ingest(path: &Path, captioner: &dyn Captioner) -> Result<ImageRecord, IngestError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| IngestError::Metadata(path.to_path_buf(), e))?;
    if !meta.is_file() {
        return Err(IngestError::NotAFile(path.to_path_buf()));
    }
    // Birth time is missing on some filesystems; modification time is the closest stand-in.
    let created = meta
        .created()
        .or_else(|_| meta.modified())
        .map_err(|e| IngestError::Metadata(path.to_path_buf(), e))?;

    let caption = match captioner.caption(path).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "captioning failed");
            String::new()
        }
    };
    Ok(make_record(path, caption, created))
}

/// Ingests each path in turn. Failures are logged and skipped; the batch always completes.
pub async fn ingest_all(paths: &[PathBuf], captioner: &dyn Captioner) -> Vec<ImageRecord> {
    let mut records = Vec::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        match ingest(path, captioner).await {
            Ok(record) => {
                tracing::debug!(n = i + 1, total = paths.len(), path = %path.display(), "ingested");
                records.push(record);
            }
            Err(e) => tracing::warn!(error = %e, "skipping image"),
        }
    }
    records
}

fn make_record(path: &Path, caption: String, created: SystemTime) -> ImageRecord {
    let local: DateTime<Local> = created.into();
    ImageRecord {
        path: path.to_path_buf(),
        caption,
        creation_date: local.format("%Y-%m-%d").to_string(),
        creation_time: local.format("%H:%M:%S").to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("failed to resolve {0}: {1}")]
    Canonicalize(PathBuf, std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("metadata error for {0}: {1}")]
    Metadata(PathBuf, std::io::Error),
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),
}

#[cfg(test)]
pub(crate) const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, NoCaptioner};
    use async_trait::async_trait;

    struct FixedCaptioner(&'static str);

    #[async_trait]
    impl Captioner for FixedCaptioner {
        async fn caption(&self, _image: &Path) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    fn png_exts() -> Vec<String> {
        vec!["png".to_string()]
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let exts = vec!["png".to_string(), ".jpg".to_string()];
        assert!(has_image_extension(Path::new("/a/B.PNG"), &exts));
        assert!(has_image_extension(Path::new("x.jpg"), &exts));
        assert!(!has_image_extension(Path::new("x.txt"), &exts));
        assert!(!has_image_extension(Path::new("png"), &exts));
    }

    #[test]
    fn scan_finds_nested_pngs_and_skips_hidden_and_fakes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("sub/deeper")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::write(root.join("top.png"), PNG_HEADER).unwrap();
        std::fs::write(root.join("sub/deeper/Shot.PNG"), PNG_HEADER).unwrap();
        std::fs::write(root.join(".hidden/secret.png"), PNG_HEADER).unwrap();
        std::fs::write(root.join("fake.png"), b"not an image at all").unwrap();
        std::fs::write(root.join("notes.txt"), b"hello").unwrap();

        let mut found = scan_images(root, &png_exts()).unwrap();
        found.sort();
        let root = root.canonicalize().unwrap();
        assert_eq!(found, vec![root.join("sub/deeper/Shot.PNG"), root.join("top.png")]);
    }

    #[tokio::test]
    async fn relative_root_gives_absolute_record_paths() {
        // Cargo runs tests from the crate dir, so the tempdir's name is a relative path.
        let dir = tempfile::tempdir_in(".").unwrap();
        std::fs::create_dir_all(dir.path().join("pics")).unwrap();
        std::fs::write(dir.path().join("pics/a.png"), PNG_HEADER).unwrap();
        let relative = Path::new(dir.path().file_name().unwrap()).join("pics");
        assert!(relative.is_relative());

        let found = scan_images(&relative, &png_exts()).unwrap();
        assert_eq!(found, vec![dir.path().join("pics/a.png").canonicalize().unwrap()]);
        let records = ingest_all(&found, &NoCaptioner).await;
        assert_eq!(records.len(), 1);
        assert!(records.iter().all(|r| r.path.is_absolute()));
    }

    #[test]
    fn scan_rejects_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, PNG_HEADER).unwrap();
        assert!(matches!(scan_images(&file, &png_exts()), Err(ScanError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn ingest_fills_caption_and_dates() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, PNG_HEADER).unwrap();
        let rec = ingest(&file, &FixedCaptioner("a cat on a mat")).await.unwrap();
        assert_eq!(rec.path, file);
        assert_eq!(rec.caption, "a cat on a mat");
        assert!(chrono::NaiveDate::parse_from_str(&rec.creation_date, "%Y-%m-%d").is_ok());
        assert!(chrono::NaiveTime::parse_from_str(&rec.creation_time, "%H:%M:%S").is_ok());
    }

    #[tokio::test]
    async fn caption_failure_leaves_empty_caption() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, PNG_HEADER).unwrap();
        let rec = ingest(&file, &NoCaptioner).await.unwrap();
        assert!(rec.caption.is_empty());
    }

    #[tokio::test]
    async fn ingest_all_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let ok = dir.path().join("ok.png");
        std::fs::write(&ok, PNG_HEADER).unwrap();
        let paths = vec![dir.path().join("gone.png"), ok.clone()];
        let recs = ingest_all(&paths, &FixedCaptioner("x")).await;
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].path, ok);
    }
}
