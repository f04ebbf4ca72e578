use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed category vocabulary. The AI batch tier is prompted with
/// exactly these names and any answer outside them is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Housing,
    Utilities,
    Food,
    Transport,
    Technology,
    Entertainment,
    Finance,
    Education,
    Healthcare,
    Shopping,
    Telecommunications,
    Other,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Housing,
        Category::Utilities,
        Category::Food,
        Category::Transport,
        Category::Technology,
        Category::Entertainment,
        Category::Finance,
        Category::Education,
        Category::Healthcare,
        Category::Shopping,
        Category::Telecommunications,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Housing => "housing",
            Category::Utilities => "utilities",
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Technology => "technology",
            Category::Entertainment => "entertainment",
            Category::Finance => "finance",
            Category::Education => "education",
            Category::Healthcare => "healthcare",
            Category::Shopping => "shopping",
            Category::Telecommunications => "telecommunications",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown category: '{s}'"))
    }
}

/// Provenance tag recording which tier resolved a transaction's category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorizationMethod {
    Stored,
    Pattern,
    Fuzzy,
    AiBatch,
    AiBatchError,
}

impl CategorizationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            CategorizationMethod::Stored => "stored",
            CategorizationMethod::Pattern => "pattern",
            CategorizationMethod::Fuzzy => "fuzzy",
            CategorizationMethod::AiBatch => "ai_batch",
            CategorizationMethod::AiBatchError => "ai_batch_error",
        }
    }
}

impl fmt::Display for CategorizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategorizationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stored" => Ok(CategorizationMethod::Stored),
            "pattern" => Ok(CategorizationMethod::Pattern),
            "fuzzy" => Ok(CategorizationMethod::Fuzzy),
            "ai_batch" => Ok(CategorizationMethod::AiBatch),
            "ai_batch_error" => Ok(CategorizationMethod::AiBatchError),
            other => Err(format!("Unknown categorization method: '{other}'")),
        }
    }
}
