// src/models/language.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Display language of a quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    De,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::De => "de",
        }
    }

    /// Picks the variant of a bilingual pair that matches this language.
    pub fn pick<'a>(&self, en: &'a str, de: &'a str) -> &'a str {
        match self {
            Language::En => en,
            Language::De => de,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Language::En),
            "de" => Ok(Language::De),
            other => Err(format!("unsupported language '{}'", other)),
        }
    }
}

/// Query parameter shared by the localized catalog endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct LangParams {
    #[serde(default)]
    pub lang: Language,
}
