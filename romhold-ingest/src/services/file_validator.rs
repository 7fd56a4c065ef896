//! File validation
//!
//! Stateless predicate over file metadata. Rules apply in order and the
//! first failure wins:
//! 1. Size must not exceed the ceiling (`FileTooLarge`)
//! 2. Name must have a non-empty final dot-segment (`MissingExtension`)
//!
//! Content is never read.

use crate::error::ValidationError;
use crate::models::RomFile;
use romhold_common::config::DEFAULT_MAX_FILE_SIZE;

/// Size/extension gate applied before hashing
#[derive(Debug, Clone, Copy)]
pub struct FileValidator {
    max_file_size: u64,
}

impl FileValidator {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Check a file's metadata against the rules
    pub fn validate(&self, file: &RomFile) -> Result<(), ValidationError> {
        if file.size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size: file.size,
                max: self.max_file_size,
            });
        }

        if file_extension(&file.name).is_none() {
            return Err(ValidationError::MissingExtension);
        }

        Ok(())
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

/// Raw text after the last '.', if non-empty
pub fn file_extension(name: &str) -> Option<&str> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.trim().is_empty() {
        None
    } else {
        Some(ext)
    }
}
