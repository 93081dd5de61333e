// src/models/session.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::language::Language;

pub const AGE_GROUPS: &[&str] = &[
    "under18", "18-24", "25-34", "35-44", "45-54", "55-64", "65plus",
];
pub const GENDERS: &[&str] = &["female", "male", "non-binary", "other", "prefer-not-to-say"];
pub const SALARY_BANDS: &[&str] = &["under25k", "25k-50k", "50k-75k", "75k-100k", "over100k"];
pub const LEADERSHIP: &[&str] = &["yes", "no"];

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{8,128}$").expect("session token pattern is valid")
});

/// Session tokens are opaque to the server but must be URL-safe and bounded.
pub fn is_valid_token(token: &str) -> bool {
    TOKEN_RE.is_match(token)
}

fn validate_token(token: &str) -> Result<(), ValidationError> {
    if !is_valid_token(token) {
        return Err(ValidationError::new("invalid_session_token"));
    }
    Ok(())
}

fn one_of(value: &str, allowed: &[&str], code: &'static str) -> Result<(), ValidationError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new(code))
    }
}

fn validate_age_group(value: &str) -> Result<(), ValidationError> {
    one_of(value, AGE_GROUPS, "unknown_age_group")
}

fn validate_gender(value: &str) -> Result<(), ValidationError> {
    one_of(value, GENDERS, "unknown_gender")
}

fn validate_salary(value: &str) -> Result<(), ValidationError> {
    // Empty means "prefer not to say".
    if value.is_empty() {
        return Ok(());
    }
    one_of(value, SALARY_BANDS, "unknown_salary_band")
}

fn validate_leadership(value: &str) -> Result<(), ValidationError> {
    one_of(value, LEADERSHIP, "unknown_leadership_answer")
}

/// Represents the 'user_sessions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserSession {
    pub id: Uuid,

    /// Externally visible token; the only identifier the client holds.
    pub session_token: String,

    pub language: String,
    pub age_group: Option<String>,
    pub gender: Option<String>,
    pub salary: Option<String>,
    pub leadership: Option<String>,
    pub previously_taken: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a fresh session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_token: String,
    pub language: Language,
}

/// Demographic enrichment written onto an existing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub age_group: String,
    pub gender: String,
    pub salary: Option<String>,
    pub leadership: String,
    pub previously_taken: bool,
}

/// DTO for opening a quiz session.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub language: Language,

    /// Client-generated token; the server generates one when absent.
    #[validate(custom(function = validate_token))]
    pub session_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_token: String,
    pub language: Language,

    /// False when the session could only be kept in the fallback path.
    pub persisted: bool,
}

/// DTO for the demographics form.
#[derive(Debug, Deserialize, Validate)]
pub struct DemographicsRequest {
    /// Demographics are only collected after explicit consent.
    pub consent: bool,

    #[validate(custom(function = validate_age_group, message = "Please select your age group"))]
    pub age_group: String,

    #[validate(custom(function = validate_gender, message = "Please select your gender"))]
    pub gender: String,

    #[validate(custom(function = validate_salary))]
    pub salary: Option<String>,

    #[validate(custom(
        function = validate_leadership,
        message = "Please indicate whether you hold a leadership position"
    ))]
    pub leadership: String,

    #[serde(default)]
    pub previously_taken: bool,
}

impl DemographicsRequest {
    pub fn into_demographics(self) -> Demographics {
        Demographics {
            age_group: self.age_group,
            gender: self.gender,
            salary: self.salary.filter(|s| !s.is_empty()),
            leadership: self.leadership,
            previously_taken: self.previously_taken,
        }
    }
}
