//! Upload acceptance rules
//!
//! Checks run in a fixed order and stop at the first failure:
//! file part present → filename non-empty → extension allowed → size in
//! `1..=max_file_size`. Validation has no side effects.

use tonemill_common::ServiceConfig;

use super::upload::UploadRequest;
use crate::error::Rejection;

/// Upload that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// Lowercased extension, guaranteed to be in the allow-set
    pub extension: String,
}

pub type ValidationResult = Result<Accepted, Rejection>;

#[derive(Debug, Clone)]
pub struct Validator {
    allowed_extensions: Vec<String>,
    max_file_size: usize,
}

impl Validator {
    pub fn new(allowed_extensions: Vec<String>, max_file_size: usize) -> Self {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
            max_file_size,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.allowed_extensions.clone(), config.max_file_size)
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    pub fn validate(&self, upload: &UploadRequest) -> ValidationResult {
        let filename = upload.filename.as_deref().ok_or(Rejection::MissingFile)?;

        if filename.is_empty() {
            return Err(Rejection::EmptyFilename);
        }

        let extension = extension_of(filename);
        let allowed = extension
            .as_deref()
            .map(|ext| self.allowed_extensions.iter().any(|a| a == ext))
            .unwrap_or(false);
        if !allowed {
            return Err(Rejection::UnsupportedType {
                extension,
                allowed: self.allowed_extensions.clone(),
            });
        }

        if upload.content.is_empty() {
            return Err(Rejection::EmptyContent);
        }
        if upload.content.len() > self.max_file_size {
            return Err(Rejection::TooLarge {
                max_bytes: self.max_file_size,
            });
        }

        Ok(Accepted {
            extension: extension.unwrap_or_default(),
        })
    }
}

/// Lowercased text after the final `.` of the file's base name
///
/// Directory components (either separator) are ignored. Returns `None` when
/// the base name has no `.` or ends with one.
pub fn extension_of(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (_, ext) = base.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
