use std::fmt;
use std::str::FromStr;

/// Serialization used for every message of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncodingMode {
    /// Plain JSON documents.
    Text,
    /// BSON documents, each prefixed with its own total length.
    #[default]
    Binary,
}

impl EncodingMode {
    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            EncodingMode::Text => "json",
            EncodingMode::Binary => "bson",
        }
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncodingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "text" => Ok(EncodingMode::Text),
            "bson" | "binary" => Ok(EncodingMode::Binary),
            other => Err(format!(
                "unknown encoding '{other}' (expected json|text|bson|binary)"
            )),
        }
    }
}
