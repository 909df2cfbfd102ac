//! Optional async helpers for validation runs.
//!
//! This module is available with the `async` feature.

use std::io::Cursor;
use std::path::Path;

use crate::error::EpubError;
use crate::report::ValidationReport;
use crate::validate::{validate_epub_reader, ValidationOptions};

/// Read an EPUB file asynchronously and validate it.
///
/// The file is read into memory with `tokio::fs`; validation itself runs on
/// the calling task.
pub async fn validate_epub_file_async<P: AsRef<Path>>(
    path: P,
) -> Result<ValidationReport, EpubError> {
    validate_epub_file_async_with_options(path, ValidationOptions::default()).await
}

/// Read an EPUB file asynchronously and validate it with options.
pub async fn validate_epub_file_async_with_options<P: AsRef<Path>>(
    path: P,
    options: ValidationOptions,
) -> Result<ValidationReport, EpubError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| EpubError::Io(e.to_string()))?;
    Ok(validate_epub_reader(Cursor::new(bytes), &options))
}
