use serde::{Serialize, Serializer};
use std::fmt;

/// How the semantic and lexical legs are combined.
///
/// Parsing never fails: unrecognized names land in [`SearchStrategy::Unknown`],
/// which searches answer with an empty list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchStrategy {
    /// Weighted rank fusion of both legs.
    Combined,
    /// Same output as `Combined`, with each leg on its own task.
    Parallel,
    /// Semantic hits first, lexical backfill up to `top_k`.
    SemanticFirst,
    /// Lexical hits first, semantically relevant new files folded in.
    TextFirst,
    Unknown(String),
}

impl SearchStrategy {
    pub const KNOWN: [SearchStrategy; 4] = [
        Self::Combined,
        Self::Parallel,
        Self::SemanticFirst,
        Self::TextFirst,
    ];

    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "combined" => Self::Combined,
            "parallel" => Self::Parallel,
            "semantic_first" => Self::SemanticFirst,
            "text_first" => Self::TextFirst,
            other => Self::Unknown(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Combined => "combined",
            Self::Parallel => "parallel",
            Self::SemanticFirst => "semantic_first",
            Self::TextFirst => "text_first",
            Self::Unknown(name) => name,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<&str> for SearchStrategy {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SearchStrategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
