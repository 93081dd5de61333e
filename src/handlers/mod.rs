// src/handlers/mod.rs

pub mod catalog;
pub mod quiz;
pub mod session;

use crate::{error::AppError, models::session::is_valid_token};

/// Rejects malformed session tokens taken from the URL path.
fn checked_token(token: &str) -> Result<&str, AppError> {
    if is_valid_token(token) {
        Ok(token)
    } else {
        Err(AppError::BadRequest("Invalid session token".to_string()))
    }
}
