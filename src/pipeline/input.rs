//! Input handling: validate an upload and spool it into a scoped temp file.
//!
//! lopdf loads documents from a path, so every upload is written to a
//! `NamedTempFile` inside the configured scratch directory. The file is
//! owned by [`UploadedPdf`] and deleted when that value is dropped, which
//! [`crate::pipeline::extract`] does as soon as the document is read, on
//! success and failure alike.
//!
//! Bytes are written chunk by chunk through [`UploadSink`] so the HTTP layer
//! never holds a whole upload in memory, and the size cap is enforced while
//! streaming rather than after the fact.

use crate::config::PipelineConfig;
use crate::error::{ExtractError, Pdf2BrollError};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Read size when spooling a local file.
const READ_CHUNK: usize = 64 * 1024;

/// An upload that passed validation and now lives in a scoped temp file.
#[derive(Debug)]
pub struct UploadedPdf {
    file_name: String,
    temp: NamedTempFile,
    len: u64,
}

impl UploadedPdf {
    /// Spool an in-memory buffer through an [`UploadSink`].
    pub async fn from_bytes(
        file_name: &str,
        bytes: &[u8],
        config: &PipelineConfig,
    ) -> Result<Self, Pdf2BrollError> {
        let mut sink = UploadSink::create(file_name, config).await?;
        sink.write_chunk(bytes).await?;
        sink.finish().await
    }

    /// Stream a local PDF into a temp file.
    ///
    /// The size cap is checked against the file's metadata before anything
    /// is read, and again chunk by chunk in case the file grows meanwhile.
    pub async fn from_path(path: &Path, config: &PipelineConfig) -> Result<Self, Pdf2BrollError> {
        let (file_name, mut file) = open_local(path).await?;
        check_name(&file_name)?;

        let size = file
            .metadata()
            .await
            .map_err(|e| local_io(path, e))?
            .len();
        if size > config.max_upload_bytes as u64 {
            return Err(Pdf2BrollError::UploadTooLarge {
                limit: config.max_upload_bytes,
            });
        }

        let mut sink = UploadSink::create(&file_name, config).await?;
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = file.read(&mut buf).await.map_err(|e| local_io(path, e))?;
            if n == 0 {
                break;
            }
            sink.write_chunk(&buf[..n]).await?;
        }
        sink.finish().await
    }

    /// Original file name as submitted.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Path of the scoped temp file.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Number of bytes received.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Incremental writer for one upload.
///
/// Creating a sink validates the file name before anything touches the
/// filesystem, so a rejected upload leaves no trace on disk. The
/// `NamedTempFile` owns the path and deletes it on drop; bytes go through a
/// second async handle on the same file.
#[derive(Debug)]
pub struct UploadSink {
    file_name: String,
    temp: NamedTempFile,
    writer: tokio::fs::File,
    written: u64,
    limit: usize,
}

impl UploadSink {
    pub async fn create(file_name: &str, config: &PipelineConfig) -> Result<Self, Pdf2BrollError> {
        check_name(file_name)?;

        tokio::fs::create_dir_all(&config.scratch_dir)
            .await
            .map_err(extraction_io)?;
        let scratch: PathBuf = config.scratch_dir.clone();
        let temp = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("temp_")
                .suffix(".pdf")
                .tempfile_in(&scratch)
        })
        .await
        .map_err(|e| Pdf2BrollError::Internal(e.to_string()))?
        .map_err(extraction_io)?;
        let writer = tokio::fs::File::from_std(temp.reopen().map_err(extraction_io)?);

        debug!("Spooling '{}' to {}", file_name, temp.path().display());

        Ok(Self {
            file_name: file_name.to_string(),
            temp,
            writer,
            written: 0,
            limit: config.max_upload_bytes,
        })
    }

    /// Append one chunk, failing once the running total passes the cap.
    ///
    /// On failure the sink is expected to be dropped, which deletes the
    /// partial temp file.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), Pdf2BrollError> {
        let next = self.written + chunk.len() as u64;
        if next > self.limit as u64 {
            return Err(Pdf2BrollError::UploadTooLarge { limit: self.limit });
        }
        self.writer.write_all(chunk).await.map_err(extraction_io)?;
        self.written = next;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand the temp file over. An empty upload counts as no file.
    pub async fn finish(mut self) -> Result<UploadedPdf, Pdf2BrollError> {
        if self.written == 0 {
            return Err(Pdf2BrollError::MissingFile);
        }
        self.writer.flush().await.map_err(extraction_io)?;
        Ok(UploadedPdf {
            file_name: self.file_name,
            temp: self.temp,
            len: self.written,
        })
    }
}

/// Check whether a submitted file name carries the PDF extension.
pub fn is_pdf_name(name: &str) -> bool {
    Path::new(name.trim())
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn check_name(file_name: &str) -> Result<(), Pdf2BrollError> {
    if file_name.trim().is_empty() {
        return Err(Pdf2BrollError::MissingFile);
    }
    if !is_pdf_name(file_name) {
        return Err(Pdf2BrollError::NotAPdf {
            file_name: file_name.to_string(),
        });
    }
    Ok(())
}

/// Open a local file for reading and return its file name with the handle.
pub(crate) async fn open_local(path: &Path) -> Result<(String, tokio::fs::File), Pdf2BrollError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| local_io(path, e))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    debug!("Resolved local PDF: {}", path.display());
    Ok((name, file))
}

fn local_io(path: &Path, e: std::io::Error) -> Pdf2BrollError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        Pdf2BrollError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        Pdf2BrollError::FileNotFound {
            path: path.to_path_buf(),
        }
    }
}

fn extraction_io(e: std::io::Error) -> Pdf2BrollError {
    Pdf2BrollError::ExtractionFailed {
        source: ExtractError::Io(e),
    }
}
