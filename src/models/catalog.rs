// src/models/catalog.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::language::Language;

/// Represents the 'tests' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Test {
    pub id: Uuid,
    pub name_en: String,
    pub name_de: String,
    pub description_en: String,
    pub description_de: String,

    /// Only active tests are offered to quiz-takers.
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Test {
    pub fn name(&self, lang: Language) -> &str {
        lang.pick(&self.name_en, &self.name_de)
    }

    pub fn description(&self, lang: Language) -> &str {
        lang.pick(&self.description_en, &self.description_de)
    }
}

/// Represents the 'domains' table: a scored personality dimension of a test.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    pub test_id: Uuid,
    pub name_en: String,
    pub name_de: String,
    pub description_en: String,
    pub description_de: String,

    /// Presentation order, also the axis order of the results chart.
    pub display_order: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    pub fn name(&self, lang: Language) -> &str {
        lang.pick(&self.name_en, &self.name_de)
    }

    pub fn description(&self, lang: Language) -> &str {
        lang.pick(&self.description_en, &self.description_de)
    }
}

/// Represents the 'facets' table: an optional subdivision of a domain.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Facet {
    pub id: Uuid,
    pub domain_id: Uuid,
    pub name_en: String,
    pub name_de: String,
    pub description_en: String,
    pub description_de: String,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Facet {
    pub fn name(&self, lang: Language) -> &str {
        lang.pick(&self.name_en, &self.name_de)
    }

    pub fn description(&self, lang: Language) -> &str {
        lang.pick(&self.description_en, &self.description_de)
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub test_id: Uuid,
    pub domain_id: Uuid,
    pub facet_id: Option<Uuid>,
    pub text_en: String,
    pub text_de: String,

    /// Answers to reverse-keyed questions are inverted (v -> 9 - v) before scoring.
    pub is_reverse_keyed: bool,

    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    pub fn text(&self, lang: Language) -> &str {
        lang.pick(&self.text_en, &self.text_de)
    }
}

/// DTO for sending a test to the client in one language.
#[derive(Debug, Serialize, Deserialize)]
pub struct TestView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

impl TestView {
    pub fn localize(test: &Test, lang: Language) -> Self {
        Self {
            id: test.id,
            name: test.name(lang).to_string(),
            description: test.description(lang).to_string(),
        }
    }
}

/// DTO for a domain or facet in one language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub display_order: i32,
}

impl DimensionView {
    pub fn from_domain(domain: &Domain, lang: Language) -> Self {
        Self {
            id: domain.id,
            name: domain.name(lang).to_string(),
            description: domain.description(lang).to_string(),
            display_order: domain.display_order,
        }
    }

    pub fn from_facet(facet: &Facet, lang: Language) -> Self {
        Self {
            id: facet.id,
            name: facet.name(lang).to_string(),
            description: facet.description(lang).to_string(),
            display_order: facet.display_order,
        }
    }
}

/// DTO for sending a question to the client (excludes the reverse-keyed flag).
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: Uuid,
    pub domain_id: Uuid,
    pub text: String,
    pub display_order: i32,
}

impl PublicQuestion {
    pub fn localize(question: &Question, lang: Language) -> Self {
        Self {
            id: question.id,
            domain_id: question.domain_id,
            text: question.text(lang).to_string(),
            display_order: question.display_order,
        }
    }
}

/// One window of a test's ordered question list.
#[derive(Debug, Clone)]
pub struct QuestionsPage {
    pub questions: Vec<Question>,
    pub page_index: u32,
    pub total_pages: u32,
}

/// Query parameters for the question page endpoint.
#[derive(Debug, Deserialize)]
pub struct QuestionPageParams {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub lang: Language,
}

/// Response body of the question page endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionsPageResponse {
    pub questions: Vec<PublicQuestion>,
    pub page_index: u32,
    pub total_pages: u32,
}

impl QuestionsPageResponse {
    pub fn localize(page: &QuestionsPage, lang: Language) -> Self {
        Self {
            questions: page
                .questions
                .iter()
                .map(|q| PublicQuestion::localize(q, lang))
                .collect(),
            page_index: page.page_index,
            total_pages: page.total_pages,
        }
    }
}
