// src/models/mod.rs

pub mod catalog;
pub mod language;
pub mod response;
pub mod score;
pub mod session;
