use crate::error::{ExpandoError, Result};
use serde::{Deserialize, Serialize};

/// Characters of the body's first line shown in listings.
pub const PREVIEW_CHARS: usize = 40;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExpansionEntry {
    pub trigger: String,
    pub body: String,
}

impl ExpansionEntry {
    pub fn new(trigger: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            body: body.into(),
        }
    }

    /// First line of the body, cut to `limit` characters.
    pub fn preview(&self, limit: usize) -> String {
        let first_line = self.body.lines().next().unwrap_or("");
        if first_line.chars().count() > limit {
            let cut: String = first_line.chars().take(limit).collect();
            format!("{}...", cut)
        } else {
            first_line.to_string()
        }
    }
}

/// A trigger starts with `prefix`, has at least one character after it and
/// contains no whitespace (a space would commit it half-typed).
pub fn validate_trigger(trigger: &str, prefix: char) -> Result<()> {
    if trigger.is_empty() {
        return Err(ExpandoError::invalid_trigger(trigger, "trigger is empty"));
    }
    if !trigger.starts_with(prefix) {
        return Err(ExpandoError::invalid_trigger(
            trigger,
            format!("must start with '{}'", prefix),
        ));
    }
    if trigger.chars().count() < 2 {
        return Err(ExpandoError::invalid_trigger(
            trigger,
            format!("needs at least one character after '{}'", prefix),
        ));
    }
    if trigger.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ExpandoError::invalid_trigger(
            trigger,
            "must not contain whitespace",
        ));
    }
    Ok(())
}

pub fn validate_body(body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Err(ExpandoError::EmptyBody);
    }
    Ok(())
}
