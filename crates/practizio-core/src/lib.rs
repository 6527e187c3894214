use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type PracticeId = u64;
pub type SystemPromptId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Practice {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: PracticeId,
    pub title: String,
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Practice {
    pub fn matches(&self, lowered_term: &str) -> bool {
        self.title.to_lowercase().contains(lowered_term)
            || self.description.to_lowercase().contains(lowered_term)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemPrompt {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: SystemPromptId,
    #[serde(deserialize_with = "deserialize_id")]
    pub practice_id: PracticeId,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read model served to clients: the practice plus the content of its prompt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PracticeWithPrompt {
    #[serde(flatten)]
    pub practice: Practice,
    #[serde(rename = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(rename = "systemPromptId")]
    pub system_prompt_id: Option<SystemPromptId>,
}

impl PracticeWithPrompt {
    pub fn new(practice: Practice, prompt: Option<&SystemPrompt>) -> Self {
        Self {
            practice,
            system_prompt: prompt.map(|p| p.content.clone()),
            system_prompt_id: prompt.map(|p| p.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Blank(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPractice {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category: String,
}

impl NewPractice {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            tags: Vec::new(),
            category: category.into(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("title", &self.title)?;
        require("description", &self.description)?;
        require("category", &self.category)?;
        Ok(())
    }

    pub fn into_practice(self, id: PracticeId, now: DateTime<Utc>) -> Practice {
        Practice {
            id,
            title: self.title,
            description: self.description,
            tags: self.tags,
            category: self.category,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields of a practice that may change after creation. `None` leaves the
/// stored value as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PracticePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
}

impl PracticePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.category.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            require("title", title)?;
        }
        if let Some(description) = &self.description {
            require("description", description)?;
        }
        if let Some(category) = &self.category {
            require("category", category)?;
        }
        Ok(())
    }

    /// Merges the patch into `practice`. Identity and `created_at` are never
    /// touched; `updated_at` is the caller's responsibility.
    pub fn apply_to(&self, practice: &mut Practice) {
        if let Some(title) = &self.title {
            practice.title = title.clone();
        }
        if let Some(description) = &self.description {
            practice.description = description.clone();
        }
        if let Some(tags) = &self.tags {
            practice.tags = tags.clone();
        }
        if let Some(category) = &self.category {
            practice.category = category.clone();
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Blank(field));
    }
    Ok(())
}

/// Returns "now", nudged forward when the clock has not moved past
/// `previous`, so successive mutations of one record always order.
pub fn advance_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

/// Parses a record id the way clients send it in paths and arguments.
pub fn parse_id(input: &str) -> Option<u64> {
    input.trim().parse::<u64>().ok()
}

/// Deserialize an ID that can be either a string or a number into a u64
fn deserialize_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => s.trim().parse::<u64>().map_err(serde::de::Error::custom),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("invalid id")),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    let mut tags = Vec::new();
    for val in v.unwrap_or_default() {
        if let Some(s) = val.as_str() {
            tags.push(s.to_string());
        } else if let Some(i) = val.as_i64() {
            tags.push(i.to_string());
        } else if let Some(u) = val.as_u64() {
            tags.push(u.to_string());
        }
    }
    Ok(tags)
}
