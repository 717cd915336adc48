//! Version-tagged file names for compiled system images.

use std::path::PathBuf;

use serde::Serialize;

use crate::version::parse_runtime_version;

/// Stem of the artifact the build script writes before it is tagged.
pub const CANONICAL_IMAGE_STEM: &str = "sys_julia_project";

const KNOWN_SUFFIXES: [&str; 3] = [".so", ".dylib", ".dll"];

/// Shared-library suffix of the current platform.
#[must_use]
pub fn shlib_suffix() -> &'static str {
    if cfg!(target_os = "windows") {
        ".dll"
    } else if cfg!(target_os = "macos") {
        ".dylib"
    } else {
        ".so"
    }
}

#[must_use]
pub fn canonical_image_name() -> String {
    format!("{CANONICAL_IMAGE_STEM}{}", shlib_suffix())
}

/// Builds `<base>-<version><suffix>`.
#[must_use]
pub fn format_image_name(base: &str, version: &str, suffix: &str) -> String {
    format!("{base}-{version}{suffix}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedImageName {
    pub version: String,
    pub suffix: String,
}

/// Inverse of [`format_image_name`] for files carrying `base`.
///
/// Returns `None` for names with another base, an unknown suffix, or a tag
/// that is not a runtime version.
#[must_use]
pub fn parse_image_name(base: &str, file_name: &str) -> Option<ParsedImageName> {
    let rest = file_name.strip_prefix(base)?.strip_prefix('-')?;
    let suffix = KNOWN_SUFFIXES
        .iter()
        .find(|suffix| rest.ends_with(*suffix))?;
    let version = &rest[..rest.len() - suffix.len()];
    parse_runtime_version(version)?;
    Some(ParsedImageName {
        version: version.to_string(),
        suffix: (*suffix).to_string(),
    })
}

/// A compiled image discovered in an image directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledImage {
    pub path: PathBuf,
    pub builder_version: String,
    pub stale: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for version in ["1.7.2", "1.10.0", "1.11.0-rc1"] {
            for suffix in KNOWN_SUFFIXES {
                let name = format_image_name("sys_mymod", version, suffix);
                let parsed = parse_image_name("sys_mymod", &name).expect("parse");
                assert_eq!(parsed.version, version);
                assert_eq!(parsed.suffix, suffix);
            }
        }
    }

    #[test]
    fn foreign_names_are_ignored() {
        assert_eq!(parse_image_name("sys_mymod", "sys_other-1.7.2.so"), None);
        assert_eq!(parse_image_name("sys_mymod", "sys_mymod-1.7.2.txt"), None);
        assert_eq!(parse_image_name("sys_mymod", "sys_mymod-extra.so"), None);
        assert_eq!(parse_image_name("sys_mymod", "sys_mymod.so"), None);
        assert_eq!(parse_image_name("sys_mymod", &canonical_image_name()), None);
    }

    #[test]
    fn canonical_name_uses_platform_suffix() {
        assert!(canonical_image_name().starts_with("sys_julia_project."));
        assert!(canonical_image_name().ends_with(shlib_suffix()));
    }
}
