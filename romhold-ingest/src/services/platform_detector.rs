//! Platform detection from file extensions
//!
//! Matches a file's normalized extension against the run's
//! [`PlatformExtensionIndex`]. A recommendation is made only when exactly
//! one platform claims the extension; two consoles sharing `.bin` are never
//! guessed between.

use crate::error::PlatformError;
use crate::models::platform::normalize_extension;
use crate::models::{PlatformDetection, PlatformExtensionIndex};
use crate::services::file_validator::file_extension;
use std::sync::Arc;

/// Extension → platform matcher over one registry snapshot
#[derive(Debug, Clone)]
pub struct PlatformDetector {
    index: Arc<PlatformExtensionIndex>,
}

impl PlatformDetector {
    pub fn new(index: Arc<PlatformExtensionIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &PlatformExtensionIndex {
        &self.index
    }

    /// Detect candidate platforms for a file name
    pub fn detect(&self, file_name: &str) -> PlatformDetection {
        let extension = extract_extension(file_name).unwrap_or_default();

        let possible_platforms: Vec<_> = if extension.is_empty() {
            Vec::new()
        } else {
            self.index
                .lookup(&extension)
                .into_iter()
                .map(|p| p.option())
                .collect()
        };

        let recommended_platform = match possible_platforms.as_slice() {
            [only] => Some(only.id),
            _ => None,
        };

        tracing::debug!(
            file = %file_name,
            extension = %extension,
            matches = possible_platforms.len(),
            recommended = ?recommended_platform,
            "Detected platform candidates"
        );

        PlatformDetection {
            extension,
            possible_platforms,
            recommended_platform,
        }
    }

    /// Resolve a detection into a single platform, or say why not
    pub fn resolve(&self, detection: &PlatformDetection) -> Result<i64, PlatformError> {
        match detection.recommended_platform {
            Some(id) => Ok(id),
            None if detection.is_unknown() => {
                Err(PlatformError::PlatformUnknown(detection.extension.clone()))
            }
            None => Err(PlatformError::PlatformAmbiguous {
                extension: detection.extension.clone(),
                count: detection.possible_platforms.len(),
            }),
        }
    }

    /// Validate a user-chosen platform against the snapshot
    pub fn validate_choice(&self, platform_id: i64) -> Result<i64, PlatformError> {
        if self.index.contains_platform(platform_id) {
            Ok(platform_id)
        } else {
            Err(PlatformError::NotInRegistry(platform_id))
        }
    }
}

/// Normalized extension of a file name (lowercase, no leading dot)
pub fn extract_extension(file_name: &str) -> Option<String> {
    file_extension(file_name).and_then(normalize_extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;

    fn detector(platforms: Vec<Platform>) -> PlatformDetector {
        PlatformDetector::new(Arc::new(PlatformExtensionIndex::build(&platforms)))
    }

    #[test]
    fn test_single_match_recommends() {
        let detector = detector(vec![
            Platform::with_list(1, "NES", &["nes"]),
            Platform::with_encoded(2, "SNES", r#"["snes", "smc"]"#),
        ]);

        let detection = detector.detect("game.SMC");
        assert_eq!(detection.extension, "smc");
        assert_eq!(detection.possible_platforms.len(), 1);
        assert_eq!(detection.recommended_platform, Some(2));
        assert_eq!(detector.resolve(&detection), Ok(2));
    }

    #[test]
    fn test_shared_extension_is_ambiguous() {
        let detector = detector(vec![
            Platform::with_list(10, "Genesis", &["bin", "md"]),
            Platform::with_legacy(11, "Atari 2600", ".bin"),
        ]);

        let detection = detector.detect("data.bin");
        let ids: Vec<i64> = detection.possible_platforms.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(detection.recommended_platform, None);
        assert!(detection.is_ambiguous());
        assert!(matches!(
            detector.resolve(&detection),
            Err(PlatformError::PlatformAmbiguous { count: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_extension() {
        let detector = detector(vec![Platform::with_list(1, "NES", &["nes"])]);
        let detection = detector.detect("movie.mkv");
        assert!(detection.is_unknown());
        assert_eq!(detection.recommended_platform, None);
        assert_eq!(
            detector.resolve(&detection),
            Err(PlatformError::PlatformUnknown("mkv".to_string()))
        );
    }

    #[test]
    fn test_empty_registry_yields_no_matches() {
        let detector = detector(Vec::new());
        let detection = detector.detect("mario.nes");
        assert_eq!(detection.extension, "nes");
        assert!(detection.possible_platforms.is_empty());
        assert!(detection.recommended_platform.is_none());
    }

    #[test]
    fn test_name_without_extension() {
        let detector = detector(vec![Platform::with_list(1, "NES", &["nes"])]);
        let detection = detector.detect("nes");
        assert_eq!(detection.extension, "");
        assert!(detection.is_unknown());
    }

    #[test]
    fn test_validate_choice() {
        let detector = detector(vec![
            Platform::with_list(1, "NES", &["nes"]),
            Platform::with_list(2, "Manual only", &[]),
        ]);
        assert_eq!(detector.validate_choice(1), Ok(1));
        // Platforms without extensions can still be chosen manually
        assert_eq!(detector.validate_choice(2), Ok(2));
        assert_eq!(detector.validate_choice(99), Err(PlatformError::NotInRegistry(99)));
    }

    #[test]
    fn test_extract_extension() {
        assert_eq!(extract_extension("Game (USA).Z64"), Some("z64".to_string()));
        assert_eq!(extract_extension("noext"), None);
    }
}
