// Group - a named, slug-addressed collection posts may belong to

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGroup {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

impl NewGroup {
    pub fn new(title: &str, slug: &str) -> Self {
        Self {
            title: title.to_string(),
            slug: slug.to_string(),
            description: String::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// Mutable group fields. Slug changes keep the uniqueness guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupField {
    Title(String),
    Slug(String),
    Description(String),
}

impl GroupField {
    pub fn name(&self) -> &'static str {
        match self {
            GroupField::Title(_) => "title",
            GroupField::Slug(_) => "slug",
            GroupField::Description(_) => "description",
        }
    }
}
