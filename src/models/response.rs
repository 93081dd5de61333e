// src/models/response.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Lowest and highest points of the 8-point Likert scale.
pub const LIKERT_MIN: i16 = 1;
pub const LIKERT_MAX: i16 = 8;

/// An answer on the 8-point scale. Only values 1..=8 can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct LikertValue(i16);

impl LikertValue {
    pub fn new(value: i16) -> Option<Self> {
        (LIKERT_MIN..=LIKERT_MAX)
            .contains(&value)
            .then_some(Self(value))
    }

    pub fn get(self) -> i16 {
        self.0
    }

    /// Contribution to a domain total: reverse keying maps 1<->8, 2<->7, ...
    pub fn contribution(self, reverse_keyed: bool) -> i16 {
        if reverse_keyed {
            LIKERT_MAX + LIKERT_MIN - self.0
        } else {
            self.0
        }
    }
}

impl TryFrom<i16> for LikertValue {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            format!(
                "response value {} is outside {}..={}",
                value, LIKERT_MIN, LIKERT_MAX
            )
        })
    }
}

impl From<LikertValue> for i16 {
    fn from(value: LikertValue) -> Self {
        value.0
    }
}

/// Represents the 'responses' table in the database. One row per (session, question).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    pub session_id: Uuid,
    pub test_id: Uuid,
    pub question_id: Uuid,
    pub response_value: i16,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for one answered question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewResponse {
    pub session_id: Uuid,
    pub test_id: Uuid,
    pub question_id: Uuid,
    pub value: LikertValue,
}

fn validate_values(responses: &HashMap<Uuid, i16>) -> Result<(), ValidationError> {
    if responses.is_empty() {
        return Err(ValidationError::new("no_responses"));
    }
    if responses.values().any(|v| LikertValue::new(*v).is_none()) {
        return Err(ValidationError::new("response_value_out_of_range"));
    }
    Ok(())
}

/// DTO for submitting the answers of one question page.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordResponsesRequest {
    pub test_id: Uuid,

    /// When set, every question on this page must be answered.
    pub page: Option<u32>,

    /// Key: question id. Value: raw answer on the 1..=8 scale.
    #[validate(custom(function = validate_values))]
    pub responses: HashMap<Uuid, i16>,
}

impl RecordResponsesRequest {
    /// Converts the raw answers after `validate()` has accepted them.
    pub fn likert_values(&self) -> HashMap<Uuid, LikertValue> {
        self.responses
            .iter()
            .filter_map(|(q, v)| LikertValue::new(*v).map(|v| (*q, v)))
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponsesResponse {
    pub recorded: usize,

    /// False when the answers were staged in the fallback store instead.
    pub persisted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn likert_bounds() {
        assert!(LikertValue::new(0).is_none());
        assert!(LikertValue::new(9).is_none());
        assert_eq!(LikertValue::new(1).map(LikertValue::get), Some(1));
        assert_eq!(LikertValue::new(8).map(LikertValue::get), Some(8));
    }

    #[test]
    fn reverse_keying_mirrors_the_scale() {
        for v in LIKERT_MIN..=LIKERT_MAX {
            let value = LikertValue::new(v).unwrap();
            assert_eq!(value.contribution(false), v);
            assert_eq!(value.contribution(true), 9 - v);
        }
    }

    #[test]
    fn request_rejects_out_of_range_values() {
        let mut responses = HashMap::new();
        responses.insert(Uuid::new_v4(), 5);
        responses.insert(Uuid::new_v4(), 9);
        let req = RecordResponsesRequest {
            test_id: Uuid::new_v4(),
            page: None,
            responses,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_rejects_empty_batch() {
        let req = RecordResponsesRequest {
            test_id: Uuid::new_v4(),
            page: Some(0),
            responses: HashMap::new(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn deserializing_likert_checks_range() {
        assert!(serde_json::from_str::<LikertValue>("4").is_ok());
        assert!(serde_json::from_str::<LikertValue>("12").is_err());
    }
}
