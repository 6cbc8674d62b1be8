//! Difficulty normalization
//!
//! Generated drafts describe difficulty as numbers ("7"), scores (7.5) or free
//! labels ("Entry level"). Everything folds into three levels; unknown input is
//! beginner.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// Label synonyms, matched after normalization (lowercase, `_`/space → `-`)
const LABELS: &[(&str, Difficulty)] = &[
    ("beginner", Difficulty::Beginner),
    ("basic", Difficulty::Beginner),
    ("easy", Difficulty::Beginner),
    ("novice", Difficulty::Beginner),
    ("intro", Difficulty::Beginner),
    ("introductory", Difficulty::Beginner),
    ("entry", Difficulty::Beginner),
    ("entry-level", Difficulty::Beginner),
    ("foundational", Difficulty::Beginner),
    ("elementary", Difficulty::Beginner),
    ("starter", Difficulty::Beginner),
    ("intermediate", Difficulty::Intermediate),
    ("medium", Difficulty::Intermediate),
    ("moderate", Difficulty::Intermediate),
    ("mid", Difficulty::Intermediate),
    ("mid-level", Difficulty::Intermediate),
    ("average", Difficulty::Intermediate),
    ("standard", Difficulty::Intermediate),
    ("advanced", Difficulty::Advanced),
    ("hard", Difficulty::Advanced),
    ("expert", Difficulty::Advanced),
    ("difficult", Difficulty::Advanced),
    ("proficient", Difficulty::Advanced),
    ("senior", Difficulty::Advanced),
    ("master", Difficulty::Advanced),
];

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }

    /// Numeric bands: up to 3 beginner, up to 6 intermediate, above advanced
    pub fn from_number(n: f64) -> Self {
        if !n.is_finite() || n <= 3.0 {
            Difficulty::Beginner
        } else if n <= 6.0 {
            Difficulty::Intermediate
        } else {
            Difficulty::Advanced
        }
    }

    pub fn from_label(label: &str) -> Self {
        let trimmed = label.trim();
        if let Ok(n) = trimmed.parse::<f64>() {
            return Self::from_number(n);
        }

        let key: String = trimmed
            .to_lowercase()
            .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        LABELS
            .iter()
            .find(|(label, _)| *label == key)
            .map(|(_, level)| *level)
            .unwrap_or_default()
    }

    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map(Self::from_number).unwrap_or_default(),
            Value::String(s) => Self::from_label(s),
            _ => Difficulty::Beginner,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
