// Domain types and their validation rules. Pure, no side effects.
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// No film was released before this date (first public screening).
pub fn earliest_release_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1895, 12, 28).expect("valid constant date")
}

pub const MAX_DESCRIPTION_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    pub email: String,
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    pub birthday: NaiveDate,
}

impl User {
    pub fn validate(&self) -> AppResult<()> {
        if self.email.trim().is_empty() {
            return Err(AppError::BadRequest("email must not be empty".into()));
        }
        if !well_formed_email(&self.email) {
            return Err(AppError::BadRequest(
                "email must be a valid address".into(),
            ));
        }
        if self.login.is_empty() {
            return Err(AppError::BadRequest("login must not be empty".into()));
        }
        if self.login.chars().any(char::is_whitespace) {
            return Err(AppError::BadRequest(
                "login must not contain whitespace".into(),
            ));
        }
        if self.birthday > Utc::now().date_naive() {
            return Err(AppError::BadRequest(
                "birthday must not be in the future".into(),
            ));
        }
        Ok(())
    }

    /// Blank or absent display names fall back to the login.
    pub fn normalize(&mut self) {
        let blank = self.name.as_deref().map_or(true, |n| n.trim().is_empty());
        if blank {
            self.name = Some(self.login.clone());
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.login)
    }
}

fn well_formed_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpaRating {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Film {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub release_date: NaiveDate,
    pub duration: i64,
    pub mpa: MpaRating,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

impl Film {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("film name must not be empty".into()));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(AppError::BadRequest(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_CHARS
            )));
        }
        if self.release_date < earliest_release_date() {
            return Err(AppError::BadRequest(
                "release date must not be before 1895-12-28".into(),
            ));
        }
        if self.duration <= 0 {
            return Err(AppError::BadRequest(
                "duration must be a positive number of minutes".into(),
            ));
        }
        Ok(())
    }
}
