//! Unified error types for epub_validator
//!
//! Errors here describe failures of the *tool* (an archive that cannot be
//! read, a path that escapes the container). Conformance problems found in a
//! publication are never errors; they are reported as diagnostics.

use core::fmt;

/// Top-level error type for epub_validator operations
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EpubError {
    /// ZIP archive error
    Zip(ZipError),
    /// XML or CSS could not be parsed
    Parse(String),
    /// Invalid EPUB structure that prevents validation from continuing
    InvalidEpub(String),
    /// I/O error (description only, since `std::io::Error` is not `Clone`)
    Io(String),
    /// Resource is not part of the container
    NotFound {
        /// Container path that was requested.
        path: String,
    },
    /// Resource is encrypted and no capable filter chain exists for it
    DecryptionFailed {
        /// Container path of the encrypted resource.
        path: String,
        /// Algorithm URI of the first incapable filter.
        algorithm: String,
    },
    /// A path or URL could not be normalized
    InvalidPath(PathError),
    /// Cross-reference resolution was requested a second time
    ResolutionAlreadyRun,
}

impl fmt::Display for EpubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpubError::Zip(kind) => write!(f, "ZIP error: {}", kind),
            EpubError::Parse(msg) => write!(f, "Parse error: {}", msg),
            EpubError::InvalidEpub(msg) => write!(f, "Invalid EPUB: {}", msg),
            EpubError::Io(msg) => write!(f, "I/O error: {}", msg),
            EpubError::NotFound { path } => write!(f, "resource '{}' not found", path),
            EpubError::DecryptionFailed { path, algorithm } => write!(
                f,
                "resource '{}' cannot be decrypted (algorithm {})",
                path, algorithm
            ),
            EpubError::InvalidPath(err) => write!(f, "{}", err),
            EpubError::ResolutionAlreadyRun => {
                write!(f, "cross-reference resolution has already run")
            }
        }
    }
}

/// ZIP-specific error variants
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ZipErrorKind {
    /// File not found in archive
    FileNotFound,
    /// Invalid ZIP format
    InvalidFormat,
    /// Unsupported compression method
    UnsupportedCompression,
    /// Decompression failed
    DecompressError,
    /// CRC32 mismatch
    CrcMismatch,
    /// I/O error during ZIP operations
    IoError,
    /// Central directory full (exceeded max entries)
    CentralDirFull,
    /// File exceeds maximum allowed size
    FileTooLarge,
    /// ZIP64 structures are present but unsupported
    UnsupportedZip64,
}

/// Public ZIP error type alias used across the crate API.
pub type ZipError = ZipErrorKind;

impl fmt::Display for ZipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZipErrorKind::FileNotFound => write!(f, "file not found in archive"),
            ZipErrorKind::InvalidFormat => write!(f, "invalid ZIP format"),
            ZipErrorKind::UnsupportedCompression => write!(f, "unsupported compression method"),
            ZipErrorKind::DecompressError => write!(f, "decompression failed"),
            ZipErrorKind::CrcMismatch => write!(f, "CRC32 checksum mismatch"),
            ZipErrorKind::IoError => write!(f, "I/O error"),
            ZipErrorKind::CentralDirFull => write!(f, "central directory full"),
            ZipErrorKind::FileTooLarge => write!(f, "file too large"),
            ZipErrorKind::UnsupportedZip64 => write!(f, "ZIP64 is not supported"),
        }
    }
}

/// Path normalization failures
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PathError {
    /// `..` segments climb above the container root
    InvalidPath {
        /// The offending path as given.
        path: String,
    },
    /// Percent-decoding produced bytes that are not UTF-8
    InvalidEncoding {
        /// The offending reference as given.
        reference: String,
    },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::InvalidPath { path } => {
                write!(f, "path '{}' escapes the container root", path)
            }
            PathError::InvalidEncoding { reference } => {
                write!(f, "reference '{}' is not valid percent-encoded UTF-8", reference)
            }
        }
    }
}

impl std::error::Error for EpubError {}

impl std::error::Error for ZipErrorKind {}

impl std::error::Error for PathError {}

impl From<ZipError> for EpubError {
    fn from(err: ZipError) -> Self {
        EpubError::Zip(err)
    }
}

impl From<PathError> for EpubError {
    fn from(err: PathError) -> Self {
        EpubError::InvalidPath(err)
    }
}

impl From<std::io::Error> for EpubError {
    fn from(err: std::io::Error) -> Self {
        EpubError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epub_error_display() {
        let err = EpubError::Parse("bad xml".into());
        assert_eq!(format!("{}", err), "Parse error: bad xml");
    }

    #[test]
    fn test_zip_error_converts_with_question_mark() {
        fn fails() -> Result<(), EpubError> {
            Err(ZipErrorKind::CrcMismatch)?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert_eq!(err, EpubError::Zip(ZipErrorKind::CrcMismatch));
        assert!(format!("{}", err).contains("ZIP error"));
    }

    #[test]
    fn test_decryption_failed_mentions_algorithm() {
        let err = EpubError::DecryptionFailed {
            path: "EPUB/font.otf".into(),
            algorithm: "http://www.w3.org/2001/04/xmlenc#aes256-cbc".into(),
        };
        let display = format!("{}", err);
        assert!(display.contains("EPUB/font.otf"));
        assert!(display.contains("aes256-cbc"));
    }

    #[test]
    fn test_path_error_display() {
        let err: EpubError = PathError::InvalidPath {
            path: "../../x".into(),
        }
        .into();
        assert!(format!("{}", err).contains("escapes the container root"));
    }
}
