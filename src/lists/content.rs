use crate::errors::Error;
use crate::query::{PathQuery, Queryable};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Where the members of a new list come from.
pub enum Content {
    /// Identifiers read from a stream.
    FromReader(Box<dyn AsyncRead + Send + Unpin>),
    /// Identifiers read from a file.
    FromPath(Utf8PathBuf),
    /// Whitespace separated identifiers.
    FromText(String),
    /// The objects a single-column query selects.
    FromQuery(PathQuery),
    /// Individual identifiers, which are quoted so they may contain whitespace.
    FromIdentifiers(Vec<String>),
}

/// What is actually sent to the server.
pub(crate) enum Payload {
    Text(String),
    Query(PathQuery),
}

impl Content {
    /// A file if `s` names one, otherwise text.
    pub fn probe(s: &str) -> Self {
        let path = Utf8Path::new(s);
        if path.is_file() {
            Content::FromPath(path.to_path_buf())
        } else {
            Content::FromText(s.to_string())
        }
    }

    /// Strings are probed like [Content::probe], arrays of scalars are
    /// identifiers. Nothing else can be made into a list.
    pub fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::String(s) => Ok(Content::probe(s)),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    Value::Bool(b) => Ok(b.to_string()),
                    other => Err(Error::UnsupportedContent(other.to_string())),
                })
                .collect::<Result<_, _>>()
                .map(Content::FromIdentifiers),
            other => Err(Error::UnsupportedContent(other.to_string())),
        }
    }

    pub fn query(query: &dyn Queryable) -> Self {
        Content::FromQuery(query.to_query())
    }

    pub(crate) async fn into_payload(self) -> Result<Payload, Error> {
        let payload = match self {
            Content::FromReader(mut reader) => {
                let mut text = String::new();
                reader.read_to_string(&mut text).await?;
                Payload::Text(text)
            }
            Content::FromPath(path) => Payload::Text(fs_err::tokio::read_to_string(path).await?),
            Content::FromText(text) => Payload::Text(text.trim().to_string()),
            Content::FromQuery(query) => Payload::Query(query),
            Content::FromIdentifiers(ids) => {
                Payload::Text(ids.iter().map(|id| format!("\"{}\"", id)).join("\n"))
            }
        };
        Ok(payload)
    }
}

impl std::fmt::Debug for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Content::FromReader(_) => f.write_str("FromReader(..)"),
            Content::FromPath(p) => f.debug_tuple("FromPath").field(p).finish(),
            Content::FromText(t) => f.debug_tuple("FromText").field(t).finish(),
            Content::FromQuery(q) => f.debug_tuple("FromQuery").field(q).finish(),
            Content::FromIdentifiers(ids) => f.debug_tuple("FromIdentifiers").field(ids).finish(),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::FromText(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::FromText(text)
    }
}

impl From<Vec<String>> for Content {
    fn from(ids: Vec<String>) -> Self {
        Content::FromIdentifiers(ids)
    }
}

impl From<&[&str]> for Content {
    fn from(ids: &[&str]) -> Self {
        Content::FromIdentifiers(ids.iter().map(|s| s.to_string()).collect())
    }
}

impl From<PathQuery> for Content {
    fn from(query: PathQuery) -> Self {
        Content::FromQuery(query)
    }
}

impl From<Utf8PathBuf> for Content {
    fn from(path: Utf8PathBuf) -> Self {
        Content::FromPath(path)
    }
}
