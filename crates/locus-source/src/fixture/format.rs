//! Fixture encodings.

use std::fmt;
use std::path::Path;

/// Encoding of a fixture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureFormat {
    Yaml,
    Json,
}

impl FixtureFormat {
    /// Picks the format of a fixture file.
    ///
    /// A `.yml`, `.yaml` or `.json` extension decides. Files without an
    /// extension are sniffed: a body opening with `{` or `[` is JSON,
    /// anything else YAML. Other extensions are not fixtures.
    pub fn detect(path: &Path, content: &str) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
                Some(Self::Yaml)
            },
            Some(ext) if ext.eq_ignore_ascii_case("json") => Some(Self::Json),
            Some(_) => None,
            None => Some(Self::sniff(content)),
        }
    }

    fn sniff(content: &str) -> Self {
        match content.trim_start().chars().next() {
            Some('{' | '[') => Self::Json,
            _ => Self::Yaml,
        }
    }
}

impl fmt::Display for FixtureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        })
    }
}
