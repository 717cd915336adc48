use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Where a runtime candidate was discovered, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateSource {
    ExplicitOverride,
    Bundled,
    VersionManager,
    Path,
    FreshlyInstalled,
}

impl CandidateSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExplicitOverride => "explicit-override",
            Self::Bundled => "bundled",
            Self::VersionManager => "version-manager",
            Self::Path => "PATH",
            Self::FreshlyInstalled => "freshly-installed",
        }
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuntimeCandidate {
    pub path: PathBuf,
    pub version: String,
    pub source: CandidateSource,
}

impl RuntimeCandidate {
    #[must_use]
    pub fn new(path: PathBuf, version: impl Into<String>, source: CandidateSource) -> Self {
        Self {
            path,
            version: version.into(),
            source,
        }
    }
}
