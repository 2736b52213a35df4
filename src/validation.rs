//! Required-field checks that run before any network call.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::assets::EntityKind;

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 30;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|err| err.field == field)
            .map(|err| err.message.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|err| format!("{}: {}", err.field, err.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

fn non_empty_text(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn price_value(fields: &Map<String, Value>) -> Option<f64> {
    match fields.get("price")? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn check_username(errors: &mut FieldErrors, username: Option<String>) {
    let Some(username) = username else {
        errors.push("username", "Username is required.");
        return;
    };
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        errors.push(
            "username",
            format!("Username must be {USERNAME_MIN_LEN} to {USERNAME_MAX_LEN} characters."),
        );
    } else if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        errors.push(
            "username",
            "Username may only contain letters, digits, dots and underscores.",
        );
    }
}

/// Validate a full set of fields for a new record.
pub fn validate_new(kind: EntityKind, fields: &Map<String, Value>) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::default();
    match kind {
        EntityKind::Sale => {
            if non_empty_text(fields, "title").is_none() {
                errors.push("title", "Title is required.");
            }
            match price_value(fields) {
                Some(price) if price >= 0.0 && price.is_finite() => {}
                Some(_) => errors.push("price", "Price cannot be negative."),
                None => errors.push("price", "Price is required."),
            }
        }
        EntityKind::WantToBuy => {
            if non_empty_text(fields, "title").is_none() {
                errors.push("title", "Title is required.");
            }
            if let Some(price) = price_value(fields) {
                if price < 0.0 || !price.is_finite() {
                    errors.push("price", "Price cannot be negative.");
                }
            }
        }
        EntityKind::Avatar => check_username(&mut errors, non_empty_text(fields, "username")),
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate only the fields present in an edit patch.
pub fn validate_patch(kind: EntityKind, patch: &Map<String, Value>) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::default();
    if patch.contains_key("title") && non_empty_text(patch, "title").is_none() {
        errors.push("title", "Title is required.");
    }
    if patch.contains_key("price") {
        match price_value(patch) {
            Some(price) if price >= 0.0 && price.is_finite() => {}
            Some(_) => errors.push("price", "Price cannot be negative."),
            None if kind == EntityKind::Sale => errors.push("price", "Price is required."),
            None => {}
        }
    }
    if kind == EntityKind::Avatar && patch.contains_key("username") {
        check_username(&mut errors, non_empty_text(patch, "username"));
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
