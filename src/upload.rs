//! Upload staging and validation.
//!
//! An incoming file is checked and buffered in a sequence of steps, each
//! returning a structured accept/reject result:
//!
//! 1. [`check_file_type`]: extension and declared MIME type must both be
//!    in the image allowlist.
//! 2. [`UploadStaging::begin`]: opens a uniquely named file in the
//!    staging directory.
//! 3. [`StagingWriter::write_chunk`]: appends data, enforcing the size
//!    cap as bytes arrive.
//! 4. [`StagingWriter::finish`]: yields a [`StagedFile`] ready for the
//!    media host.
//!
//! Nothing here knows about HTTP; the handler drives the steps.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::errors::GalleryError;

/// Accepted file extensions (lowercase).
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif"];

/// Accepted declared MIME types.
pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/gif"];

/// Why an upload was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("No file uploaded")]
    MissingFile,

    #[error("Only image files are allowed (jpeg, jpg, png, gif)")]
    UnsupportedType,

    #[error("File too large (max {limit} bytes)")]
    TooLarge { limit: u64 },
}

/// Staging failure: either a rejection or a local I/O error.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Rejected(#[from] UploadRejection),

    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<UploadRejection> for GalleryError {
    fn from(rejection: UploadRejection) -> Self {
        GalleryError::validation(rejection.to_string())
    }
}

impl From<StageError> for GalleryError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::Rejected(rejection) => rejection.into(),
            StageError::Io(io) => GalleryError::Internal(io.into()),
        }
    }
}

/// Check the declared name and MIME type, returning the normalized
/// extension.
pub fn check_file_type(file_name: &str, content_type: &str) -> Result<String, UploadRejection> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or(UploadRejection::UnsupportedType)?;

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) && ALLOWED_MIME_TYPES.contains(&mime.as_str())
    {
        Ok(extension)
    } else {
        Err(UploadRejection::UnsupportedType)
    }
}

/// The staging directory plus the size cap applied to every file.
#[derive(Debug, Clone)]
pub struct UploadStaging {
    dir: PathBuf,
    max_file_size: u64,
}

impl UploadStaging {
    /// Use `dir` for staging, creating it if absent.
    pub fn new(dir: impl Into<PathBuf>, max_file_size: u64) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow::anyhow!("Failed to create staging dir {dir:?}: {e}"))?;
        Ok(Self { dir, max_file_size })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Validate the file type and open a staging file for it.
    pub async fn begin(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<StagingWriter, StageError> {
        let extension = check_file_type(file_name, content_type)?;
        let path = self
            .dir
            .join(format!("{}.{}", uuid::Uuid::new_v4().simple(), extension));
        let file = tokio::fs::File::create(&path).await?;
        Ok(StagingWriter {
            file,
            path,
            original_name: file_name.to_string(),
            content_type: content_type.to_string(),
            written: 0,
            limit: self.max_file_size,
        })
    }
}

/// An open staging file receiving upload data.
#[derive(Debug)]
pub struct StagingWriter {
    file: tokio::fs::File,
    path: PathBuf,
    original_name: String,
    content_type: String,
    written: u64,
    limit: u64,
}

impl StagingWriter {
    /// Append `chunk`, refusing once the size cap would be exceeded.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StageError> {
        let next = self.written + chunk.len() as u64;
        if next > self.limit {
            return Err(UploadRejection::TooLarge { limit: self.limit }.into());
        }
        self.file.write_all(chunk).await?;
        self.written = next;
        Ok(())
    }

    /// Flush and hand over the staged file.
    pub async fn finish(mut self) -> Result<StagedFile, StageError> {
        self.file.flush().await?;
        Ok(StagedFile {
            path: self.path,
            original_name: self.original_name,
            content_type: self.content_type,
            size: self.written,
        })
    }

    /// Abandon the file and remove it from the staging directory.
    pub async fn discard(self) {
        let path = self.path.clone();
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Failed to remove partial staging file {path:?}: {e}");
        }
    }
}

/// A fully staged, validated upload.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub original_name: String,
    pub content_type: String,
    pub size: u64,
}

impl StagedFile {
    /// Delete the staged copy.
    pub async fn remove(&self) -> std::io::Result<()> {
        tokio::fs::remove_file(&self.path).await
    }
}
