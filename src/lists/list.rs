use crate::types::ListName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Metadata of a list, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub name: ListName,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Class of the objects in the list.
    #[serde(rename = "type")]
    pub list_type: String,
    pub size: u64,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub authorized: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Identifiers which matched nothing when this list was created or appended to.
    #[serde(skip)]
    pub unmatched_identifiers: BTreeSet<String>,
}

impl List {
    /// Whether the current user may change this list. Assumed when the server does not say.
    pub fn is_authorized(&self) -> bool {
        self.authorized.unwrap_or(true)
    }
}

impl Display for List {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} {})", self.name, self.size, self.list_type)?;
        if let Some(date) = self.date_created.as_deref().filter(|d| !d.is_empty()) {
            write!(f, " {}", date)?;
        }
        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            write!(f, " {}", description)?;
        }
        Ok(())
    }
}
