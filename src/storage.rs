use chrono::{Datelike, Local};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dataurl;

/// Content-addressed store: process-wide defaults plus per-request overrides.
#[derive(Clone, Debug)]
pub struct Storage {
    base_dir: PathBuf,
    uri_prefix: String,
}

/// Per-request placement overrides, layered on top of the configured defaults.
#[derive(Clone, Debug, Default)]
pub struct StoreParams {
    pub base_dir: Option<PathBuf>,
    pub uri_prefix: Option<String>,
    pub sub_directory: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub size: u64,
    pub name: String,
    pub hash: String,
    pub extension: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub absolute_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub relative_path: String,
    pub public_path: String,
    pub original_name: String,
}

impl StoredFile {
    /// Blank the filesystem paths before the record leaves the process.
    pub fn redact_paths(&mut self) {
        self.absolute_path.clear();
        self.relative_path.clear();
    }
}

#[derive(Debug)]
pub enum StoreError {
    SourceRead(io::Error),
    InvalidPayload(String),
    InvalidSubDirectory,
    CreateDir(io::Error),
    Write(io::Error),
    PathResolution(io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::SourceRead(err) => write!(f, "read upload source: {err}"),
            StoreError::InvalidPayload(msg) => write!(f, "invalid payload: {msg}"),
            StoreError::InvalidSubDirectory => write!(f, "invalid sub directory"),
            StoreError::CreateDir(err) => write!(f, "create storage directory: {err}"),
            StoreError::Write(err) => write!(f, "write destination file: {err}"),
            StoreError::PathResolution(err) => write!(f, "resolve absolute path: {err}"),
        }
    }
}

struct PlannedLocation {
    name: String,
    directory: PathBuf,
    absolute: PathBuf,
    relative: String,
    public: String,
}

impl Storage {
    pub fn new(base_dir: PathBuf, uri_prefix: String) -> Self {
        Self {
            base_dir,
            uri_prefix,
        }
    }

    pub async fn ensure_base(&self) -> io::Result<()> {
        fs::create_dir_all(&self.base_dir).await
    }

    pub fn base_path(&self) -> &Path {
        &self.base_dir
    }

    /// Store one fully-buffered payload under its content hash.
    ///
    /// A regular file of the same size already sitting at the destination is
    /// a duplicate (the hash-derived name guarantees content identity) and
    /// the write is skipped entirely.
    pub async fn store_bytes(
        &self,
        content: &[u8],
        original_name: &str,
        extension: &str,
        params: &StoreParams,
    ) -> Result<StoredFile, StoreError> {
        let hash = sha256_hex(content);
        let planned = self.plan(&hash, extension, params)?;

        fs::create_dir_all(&planned.directory)
            .await
            .map_err(StoreError::CreateDir)?;

        match fs::metadata(&planned.absolute).await {
            Ok(existing) if existing.is_file() && existing.len() == content.len() as u64 => {
                debug!(name = planned.name, "duplicate content, skipping write");
            }
            Ok(existing) if existing.is_dir() => {
                return Err(StoreError::Write(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "destination exists and is a directory",
                )));
            }
            Ok(existing) => {
                // Same name but a different size: leftover from an
                // interrupted write, safe to replace.
                warn!(
                    name = planned.name,
                    expected = content.len(),
                    found = existing.len(),
                    "same-name file with unexpected size, rewriting"
                );
                write_atomic(&planned.directory, &planned.name, content)
                    .await
                    .map_err(StoreError::Write)?;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                write_atomic(&planned.directory, &planned.name, content)
                    .await
                    .map_err(StoreError::Write)?;
            }
            Err(err) => return Err(StoreError::Write(err)),
        }

        Ok(StoredFile {
            size: content.len() as u64,
            name: planned.name,
            hash,
            extension: extension.to_string(),
            absolute_path: planned.absolute.to_string_lossy().into_owned(),
            relative_path: planned.relative,
            public_path: planned.public,
            original_name: original_name.to_string(),
        })
    }

    /// Store one `data:image/<subtype>;base64,<payload>` string.
    pub async fn store_base64(
        &self,
        payload: &str,
        params: &StoreParams,
    ) -> Result<StoredFile, StoreError> {
        let image = dataurl::parse_image(payload)?;
        self.store_bytes(&image.content, "", &image.extension, params)
            .await
    }

    /// Store an ordered batch of base64 payloads, skipping empty entries.
    /// The first error aborts the batch; earlier results are discarded.
    pub async fn store_base64_many(
        &self,
        payloads: &[String],
        params: &StoreParams,
    ) -> Result<Vec<StoredFile>, StoreError> {
        let mut stored = Vec::with_capacity(payloads.len());
        for payload in payloads {
            if payload.is_empty() {
                continue;
            }
            stored.push(self.store_base64(payload, params).await?);
        }
        Ok(stored)
    }

    fn plan(
        &self,
        hash: &str,
        extension: &str,
        params: &StoreParams,
    ) -> Result<PlannedLocation, StoreError> {
        let name = format!("{hash}{extension}");
        let base = params
            .base_dir
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or(&self.base_dir);
        let uri_prefix = params
            .uri_prefix
            .as_deref()
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or(&self.uri_prefix);

        let sub = normalize_sub_directory(&params.sub_directory)?;
        let directory = if sub.as_os_str().is_empty() {
            base.to_path_buf()
        } else {
            base.join(&sub)
        };
        let located = directory.join(&name);

        let (absolute, relative) = if located.is_absolute() {
            let relative = located
                .strip_prefix(base)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| located.clone());
            (located, path_to_slash(&relative))
        } else {
            let absolute = std::path::absolute(&located).map_err(StoreError::PathResolution)?;
            (absolute, path_to_slash(&located))
        };

        let sub_slash = path_to_slash(&sub);
        let public = join_public([uri_prefix, sub_slash.as_str(), name.as_str()]);

        Ok(PlannedLocation {
            name,
            directory,
            absolute,
            relative,
            public,
        })
    }
}

/// Lowercase hex SHA-256 digest of the given bytes.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Filename suffix including the dot, empty when there is none.
pub fn extension_of(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match base.rfind('.') {
        Some(index) => base[index..].to_string(),
        None => String::new(),
    }
}

/// Append `<year>/<month>/<day>` to the given relative prefix, recomputed
/// from the wall clock on every call.
pub fn date_sub_directory(prefix: &str) -> String {
    let now = Local::now();
    let stamped = format!("{:04}/{:02}/{:02}", now.year(), now.month(), now.day());
    let prefix = prefix.trim_matches(['/', '\\']);
    if prefix.is_empty() {
        stamped
    } else {
        format!("{prefix}/{stamped}")
    }
}

// The sub directory is caller-supplied, so it may only contain normal
// components: no `..`, no root, no drive prefix.
fn normalize_sub_directory(sub_directory: &str) -> Result<PathBuf, StoreError> {
    let trimmed = sub_directory.trim().trim_start_matches(['/', '\\']);
    let mut normalized = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StoreError::InvalidSubDirectory);
            }
        }
    }
    Ok(normalized)
}

fn path_to_slash(path: &Path) -> String {
    path.to_string_lossy()
        .replace(std::path::MAIN_SEPARATOR, "/")
}

// URL paths use `/` exclusively and always start with `/`, regardless of the
// host separator.
fn join_public(segments: [&str; 3]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in &segments {
        parts.extend(segment.split(['/', '\\']).filter(|part| !part.is_empty()));
    }
    format!("/{}", parts.join("/"))
}

async fn write_atomic(directory: &Path, name: &str, content: &[u8]) -> io::Result<()> {
    let temp_path = directory.join(format!(".{name}.tmp.{}", Uuid::new_v4()));
    let result = async {
        let mut file = File::create(&temp_path).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, directory.join(name)).await
    }
    .await;
    if result.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn resolver(base: &str, prefix: &str) -> Storage {
        Storage::new(PathBuf::from(base), prefix.to_string())
    }

    #[test]
    fn naming_is_idempotent() {
        let first = format!("{}{}", sha256_hex(b"payload"), ".png");
        let second = format!("{}{}", sha256_hex(b"payload"), ".png");
        assert_eq!(first, second);
        assert_ne!(first, format!("{}{}", sha256_hex(b"other"), ".png"));
    }

    #[test]
    fn sha256_hex_is_lowercase() {
        let digest = sha256_hex(b"hello");
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(digest.len(), 64);
    }

    #[cfg(unix)]
    #[test]
    fn plan_builds_expected_paths() {
        let storage = resolver("/data", "/static");
        let params = StoreParams {
            sub_directory: "2024/01/01".to_string(),
            ..Default::default()
        };
        let planned = storage.plan("abc123", ".png", &params).expect("plan");
        assert_eq!(planned.absolute, Path::new("/data/2024/01/01/abc123.png"));
        assert_eq!(planned.public, "/static/2024/01/01/abc123.png");
        assert_eq!(planned.relative, "2024/01/01/abc123.png");
        assert_eq!(planned.name, "abc123.png");
    }

    #[test]
    fn plan_without_sub_directory_uses_base() {
        let storage = resolver("data", "/static");
        let params = StoreParams::default();
        let planned = storage.plan("abc123", "", &params).expect("plan");
        assert_eq!(planned.directory, Path::new("data"));
        assert_eq!(planned.public, "/static/abc123");
        assert!(planned.absolute.is_absolute());
    }

    #[test]
    fn plan_applies_per_request_overrides() {
        let storage = resolver("/data", "/static");
        let params = StoreParams {
            base_dir: Some(PathBuf::from("/other")),
            uri_prefix: Some("/cdn".to_string()),
            sub_directory: "tenant".to_string(),
        };
        let planned = storage.plan("abc123", ".jpg", &params).expect("plan");
        assert_eq!(planned.public, "/cdn/tenant/abc123.jpg");
        assert!(planned.absolute.starts_with("/other"));
    }

    #[test]
    fn plan_rejects_parent_components() {
        let storage = resolver("/data", "/static");
        let params = StoreParams {
            sub_directory: "../escape".to_string(),
            ..Default::default()
        };
        let result = storage.plan("abc123", ".png", &params);
        assert!(matches!(result, Err(StoreError::InvalidSubDirectory)));
    }

    #[test]
    fn public_path_starts_with_slash_even_without_prefix() {
        let storage = resolver("/data", "");
        let params = StoreParams {
            sub_directory: "a/b".to_string(),
            ..Default::default()
        };
        let planned = storage.plan("abc123", ".png", &params).expect("plan");
        assert_eq!(planned.public, "/a/b/abc123.png");
    }

    #[test]
    fn extension_includes_dot() {
        assert_eq!(extension_of("photo.png"), ".png");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of(".bashrc"), ".bashrc");
        assert_eq!(extension_of("dir/file.txt"), ".txt");
    }

    #[test]
    fn date_sub_directory_appends_date() {
        let value = date_sub_directory("project");
        let parts: Vec<&str> = value.split('/').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "project");
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[2].len(), 2);
        assert_eq!(parts[3].len(), 2);
        for part in &parts[1..] {
            assert!(part.chars().all(|c| c.is_ascii_digit()));
        }
        assert_eq!(date_sub_directory("").split('/').count(), 3);
    }

    #[tokio::test]
    async fn duplicate_upload_writes_once() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().join("uploads"), "/static".to_string());
        let params = StoreParams {
            sub_directory: "t".to_string(),
            ..Default::default()
        };

        let first = storage
            .store_bytes(b"hello", "hello.txt", ".txt", &params)
            .await
            .expect("first store");
        let second = storage
            .store_bytes(b"hello", "hello.txt", ".txt", &params)
            .await
            .expect("second store");
        assert_eq!(first, second);

        let dir = temp.path().join("uploads/t");
        let entries = std::fs::read_dir(&dir).expect("read dir").count();
        assert_eq!(entries, 1);
        let contents = std::fs::read(dir.join(&first.name)).expect("read stored file");
        assert_eq!(contents, b"hello");
    }

    #[tokio::test]
    async fn stored_record_reflects_content() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().join("uploads"), "/static".to_string());
        let params = StoreParams {
            sub_directory: "docs".to_string(),
            ..Default::default()
        };

        let record = storage
            .store_bytes(b"hello", "greeting.txt", ".txt", &params)
            .await
            .expect("store");
        assert_eq!(record.size, 5);
        assert_eq!(record.hash, sha256_hex(b"hello"));
        assert_eq!(record.name, format!("{}.txt", record.hash));
        assert_eq!(record.public_path, format!("/static/docs/{}", record.name));
        assert_eq!(record.original_name, "greeting.txt");
        assert!(Path::new(&record.absolute_path).is_absolute());
        assert!(std::fs::metadata(&record.absolute_path).is_ok());
    }

    #[tokio::test]
    async fn rewrites_same_name_file_with_different_size() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().join("uploads"), String::new());
        let params = StoreParams::default();

        let record = storage
            .store_bytes(b"hello", "", ".bin", &params)
            .await
            .expect("store");
        // Simulate a truncated leftover under the same content address.
        std::fs::write(&record.absolute_path, b"he").expect("truncate");

        storage
            .store_bytes(b"hello", "", ".bin", &params)
            .await
            .expect("restore");
        let contents = std::fs::read(&record.absolute_path).expect("read");
        assert_eq!(contents, b"hello");
    }

    #[test]
    fn redacted_record_omits_paths_in_json() {
        let mut record = StoredFile {
            size: 5,
            name: "abc.txt".to_string(),
            hash: "abc".to_string(),
            extension: ".txt".to_string(),
            absolute_path: "/data/abc.txt".to_string(),
            relative_path: "abc.txt".to_string(),
            public_path: "/static/abc.txt".to_string(),
            original_name: "hello.txt".to_string(),
        };
        record.redact_paths();
        let value = serde_json::to_value(&record).expect("serialize");
        assert!(value.get("absolutePath").is_none());
        assert!(value.get("relativePath").is_none());
        assert_eq!(value["publicPath"], "/static/abc.txt");
    }
}
