//! Static biography payload answering `get_work_experience`.

use crate::error::BiographyError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

const EMBEDDED: &str = include_str!("../assets/biography.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Biography {
    pub owner: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub contact: Option<String>,
    /// Returned verbatim for the `work` category.
    #[serde(default)]
    pub work: Value,
    #[serde(default)]
    pub projects: Value,
    #[serde(default)]
    pub skills: Value,
}

impl Biography {
    /// The payload compiled into the binary.
    pub fn embedded() -> Result<Self, BiographyError> {
        Ok(serde_json::from_str(EMBEDDED)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BiographyError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Loads `path` when given, otherwise the embedded payload.
    pub fn load(path: Option<&str>) -> Result<Self, BiographyError> {
        match path {
            Some(p) => Self::from_path(p),
            None => Self::embedded(),
        }
    }

    /// Looks up one category.
    ///
    /// An unknown category yields `{}`. For `work`, `company` narrows the
    /// entries to those whose company contains it (case-insensitive); when
    /// nothing matches the full list is returned.
    pub fn lookup(&self, category: &str, company: Option<&str>) -> Value {
        match category {
            "work" => self.work_for(company),
            "projects" => self.projects.clone(),
            "skills" => self.skills.clone(),
            _ => json!({}),
        }
    }

    fn work_for(&self, company: Option<&str>) -> Value {
        let (Some(needle), Value::Array(entries)) = (company, &self.work) else {
            return self.work.clone();
        };
        let needle = needle.to_lowercase();
        let matched: Vec<Value> = entries
            .iter()
            .filter(|entry| {
                entry
                    .get("company")
                    .and_then(Value::as_str)
                    .is_some_and(|c| c.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();

        if matched.is_empty() {
            self.work.clone()
        } else {
            Value::Array(matched)
        }
    }
}
