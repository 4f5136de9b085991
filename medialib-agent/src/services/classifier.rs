//! File classification
//!
//! Pure function of the file name, its extension, and the configured
//! extension sets and junk rules. Junk patterns are shell globs matched
//! case-insensitively against the base name; an extension listed in
//! `junk_exclude_extensions` is exempt from junk classification. No
//! filesystem access happens here.

use globset::{GlobBuilder, GlobMatcher};
use medialib_common::config::AgentConfig;
use medialib_common::records::FileKind;
use std::collections::HashSet;
use std::path::Path;

/// Classification outcome. `reason` is the matched junk pattern and is
/// only present for `kind == Junk`.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: FileKind,
    pub reason: Option<String>,
}

impl Classification {
    fn of(kind: FileKind) -> Self {
        Self { kind, reason: None }
    }
}

/// Compiled classifier built once per configuration.
pub struct Classifier {
    video: HashSet<String>,
    image: HashSet<String>,
    subtitle: HashSet<String>,
    xml: HashSet<String>,
    junk: Vec<(String, GlobMatcher)>,
    junk_exclude: HashSet<String>,
}

impl Classifier {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        let mut junk = Vec::with_capacity(cfg.junk_patterns.len());
        for pattern in &cfg.junk_patterns {
            match GlobBuilder::new(pattern).case_insensitive(true).build() {
                Ok(glob) => junk.push((pattern.clone(), glob.compile_matcher())),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "Skipping invalid junk pattern");
                }
            }
        }

        Self {
            video: normalize_ext_set(&cfg.media_extensions.video),
            image: normalize_ext_set(&cfg.media_extensions.image),
            subtitle: normalize_ext_set(&cfg.media_extensions.subtitle),
            xml: normalize_ext_set(&cfg.media_extensions.xml),
            junk,
            junk_exclude: normalize_ext_set(&cfg.junk_exclude_extensions),
        }
    }

    /// Classify a file by base name and (already normalized) extension.
    pub fn classify(&self, file_name: &str, ext: &str) -> Classification {
        if !self.junk_exclude.contains(ext) {
            for (pattern, matcher) in &self.junk {
                if matcher.is_match(file_name) {
                    return Classification {
                        kind: FileKind::Junk,
                        reason: Some(pattern.clone()),
                    };
                }
            }
        }

        if self.video.contains(ext) {
            Classification::of(FileKind::Video)
        } else if self.image.contains(ext) {
            Classification::of(FileKind::Image)
        } else if self.subtitle.contains(ext) {
            Classification::of(FileKind::Subtitle)
        } else if self.xml.contains(ext) {
            Classification::of(FileKind::Xml)
        } else {
            Classification::of(FileKind::Other)
        }
    }
}

/// Extension of a path, ASCII-lowercased, without the leading dot.
/// Empty when the file has no extension.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Normalize a configured extension: strip a leading dot, ASCII
/// lowercase. Configs historically list extensions as ".mkv".
fn normalize_ext(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

fn normalize_ext_set(exts: &[String]) -> HashSet<String> {
    exts.iter().map(|e| normalize_ext(e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        let cfg: AgentConfig = serde_json::from_str(
            r#"{
                "junk_patterns": ["*.part", "sample-*"],
                "junk_exclude_extensions": [".nfo"],
                "media_extensions": {
                    "video": [".mkv", ".mp4"],
                    "image": [".jpg"],
                    "subtitle": [".srt"],
                    "xml": [".xml", ".nfo"]
                }
            }"#,
        )
        .unwrap();
        Classifier::from_config(&cfg)
    }

    #[test]
    fn classifies_by_extension_set() {
        let c = classifier();
        assert_eq!(c.classify("a.mkv", "mkv").kind, FileKind::Video);
        assert_eq!(c.classify("poster.jpg", "jpg").kind, FileKind::Image);
        assert_eq!(c.classify("a.srt", "srt").kind, FileKind::Subtitle);
        assert_eq!(c.classify("show.xml", "xml").kind, FileKind::Xml);
        assert_eq!(c.classify("b.txt", "txt").kind, FileKind::Other);
        assert_eq!(c.classify("noext", "").kind, FileKind::Other);
    }

    #[test]
    fn junk_pattern_wins_and_names_pattern() {
        let c = classifier();
        let result = c.classify("movie.part", "part");
        assert_eq!(result.kind, FileKind::Junk);
        assert_eq!(result.reason.as_deref(), Some("*.part"));

        // Junk beats a matching media extension.
        let result = c.classify("sample-episode.mkv", "mkv");
        assert_eq!(result.kind, FileKind::Junk);
        assert_eq!(result.reason.as_deref(), Some("sample-*"));
    }

    #[test]
    fn junk_matching_is_case_insensitive() {
        let c = classifier();
        let result = c.classify("MOVIE.PART", "part");
        assert_eq!(result.kind, FileKind::Junk);
        assert_eq!(result.reason.as_deref(), Some("*.part"));
    }

    #[test]
    fn excluded_extension_escapes_junk() {
        let c = classifier();
        // "sample-show.nfo" matches a junk pattern but .nfo is excluded,
        // so it falls through to its extension kind.
        let result = c.classify("sample-show.nfo", "nfo");
        assert_eq!(result.kind, FileKind::Xml);
        assert!(result.reason.is_none());
    }

    #[test]
    fn classification_is_deterministic() {
        let c = classifier();
        let first = c.classify("movie.part", "part");
        for _ in 0..10 {
            assert_eq!(c.classify("movie.part", "part"), first);
        }
    }

    #[test]
    fn extension_normalization() {
        assert_eq!(extension_of(Path::new("/r/A.MKV")), "mkv");
        assert_eq!(extension_of(Path::new("/r/noext")), "");
        assert_eq!(extension_of(Path::new("/r/archive.tar.gz")), "gz");
        assert_eq!(normalize_ext(".MKV"), "mkv");
        assert_eq!(normalize_ext("srt"), "srt");
    }
}
