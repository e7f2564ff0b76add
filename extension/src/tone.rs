use std::fmt;

use serde::{Deserialize, Serialize};

/// Rewrite style requested from the backend; serialized as the `mode` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Clarity,
    Professional,
    Friendly,
}

impl Tone {
    pub const ALL: [Tone; 3] = [Tone::Clarity, Tone::Professional, Tone::Friendly];

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Clarity => "clarity",
            Tone::Professional => "professional",
            Tone::Friendly => "friendly",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tone::Clarity => "Clarity",
            Tone::Professional => "Professional",
            Tone::Friendly => "Friendly",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Tone::Clarity => "🎯",
            Tone::Professional => "💼",
            Tone::Friendly => "😊",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
