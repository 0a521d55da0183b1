//! Objects decoded from the `jsonobjects` format, which can load fields they
//! were not delivered with.

use crate::errors::{Error, ProtocolError};
use crate::model::{ClassDescriptor, Field, FieldKind, Model};
use crate::types::headless;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display, Formatter};

/// Loads one field of a stored object, identified by its class and internal id.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    /// Returns the raw JSON of the field (a scalar, an object or an array of
    /// objects), or `None` if the server has nothing for it.
    async fn fetch_field(
        &self,
        class: &ClassDescriptor,
        id: i64,
        field: &Field,
    ) -> Result<Option<Value>, Error>;
}

/// What an object already holds for one of its fields.
#[derive(Debug)]
pub enum Slot<'s> {
    /// An attribute value from the payload, as-is.
    Embedded(Value),
    /// A to-one reference from the payload, `None` if it was null.
    EmbeddedRef(Option<ResultObject<'s>>),
    /// A to-many collection from the payload.
    EmbeddedCollection(Vec<ResultObject<'s>>),
    /// Not part of the payload.
    NotLoaded,
}

/// Value of a field after [ResultObject::resolve].
#[derive(Debug)]
pub enum Attribute<'s> {
    Value(Value),
    Object(Option<ResultObject<'s>>),
    Collection(Vec<ResultObject<'s>>),
}

impl<'s> Attribute<'s> {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Attribute::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ResultObject<'s>> {
        match self {
            Attribute::Object(o) => o.as_ref(),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[ResultObject<'s>]> {
        match self {
            Attribute::Collection(c) => Some(c),
            _ => None,
        }
    }
}

/// A record of the data model, backed by the JSON the server sent for it.
///
/// Fields are read with [ResultObject::lookup], which never touches the
/// network, or [ResultObject::resolve], which asks the server for fields
/// missing from the payload and caches what it gets.
pub struct ResultObject<'s> {
    data: Map<String, Value>,
    class: &'s ClassDescriptor,
    model: &'s Model,
    fetcher: &'s dyn ObjectFetcher,
    /// Attributes of this object in the view.
    selected_attributes: HashSet<String>,
    /// View paths below each reference, relative to this object.
    reference_paths: HashMap<String, Vec<String>>,
    cache: HashMap<String, Attribute<'s>>,
}

impl<'s> ResultObject<'s> {
    /// `view` holds the paths of the query which pass through this object,
    /// each still prefixed by the name of this object's position, e.g.
    /// `Gene.symbol` for the root or `organism.name` for a gene's organism.
    pub fn new(
        data: Value,
        class: &'s ClassDescriptor,
        model: &'s Model,
        fetcher: &'s dyn ObjectFetcher,
        view: &[String],
    ) -> Result<Self, Error> {
        let data = match data {
            Value::Object(data) => data,
            other => {
                return Err(ProtocolError::UnexpectedValue {
                    expected: "a JSON object",
                    actual: other.to_string(),
                }
                .into())
            }
        };
        let class = match data.get("class").and_then(Value::as_str) {
            Some(name) if name != class.name => match model.get_class(name) {
                Ok(subclass) => subclass,
                Err(_) => {
                    log::debug!("{} is not in the model, treating it as {}", name, class.name);
                    class
                }
            },
            _ => class,
        };
        let mut selected_attributes = HashSet::new();
        let mut reference_paths: HashMap<String, Vec<String>> = HashMap::new();
        for path in view.iter().map(|p| headless(p)) {
            match path.split_once('.') {
                Some((reference, _)) => reference_paths
                    .entry(reference.to_string())
                    .or_default()
                    .push(path.to_string()),
                None => {
                    selected_attributes.insert(path.to_string());
                }
            }
        }
        Ok(Self {
            data,
            class,
            model,
            fetcher,
            selected_attributes,
            reference_paths,
            cache: HashMap::new(),
        })
    }

    /// Internal database id, if this object was stored.
    pub fn id(&self) -> Option<i64> {
        self.data.get("objectId").and_then(Value::as_i64)
    }

    /// Name of the most specific class of this object.
    pub fn type_name(&self) -> &str {
        self.data
            .get("class")
            .and_then(Value::as_str)
            .unwrap_or(&self.class.name)
    }

    pub fn class(&self) -> &'s ClassDescriptor {
        self.class
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_raw(self) -> Map<String, Value> {
        self.data
    }

    fn field(&self, name: &str) -> Result<&'s Field, Error> {
        self.class.get_field(name).ok_or_else(|| Error::NoSuchField {
            class: self.class.name.clone(),
            field: name.to_string(),
        })
    }

    fn wrap(&self, field: &Field, data: Value) -> Result<ResultObject<'s>, Error> {
        let referenced_type = field
            .referenced_type()
            .ok_or_else(|| Error::UnknownClass(field.name.clone()))?;
        let class = self.model.get_class(referenced_type)?;
        let view = self
            .reference_paths
            .get(&field.name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        ResultObject::new(data, class, self.model, self.fetcher, view)
    }

    fn wrap_all(&self, field: &Field, data: Value) -> Result<Vec<ResultObject<'s>>, Error> {
        match data {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.into_iter().map(|x| self.wrap(field, x)).collect(),
            other => Err(ProtocolError::UnexpectedValue {
                expected: "an array of objects",
                actual: other.to_string(),
            }
            .into()),
        }
    }

    /// What the payload holds for the field `name`, without any fetching.
    ///
    /// Fails with [Error::NoSuchField] if the class has no such field.
    pub fn lookup(&self, name: &str) -> Result<Slot<'s>, Error> {
        let field = self.field(name)?;
        let Some(data) = self.data.get(name) else {
            return Ok(Slot::NotLoaded);
        };
        let slot = match &field.kind {
            FieldKind::Attribute { .. } => Slot::Embedded(data.clone()),
            FieldKind::Reference { .. } => match data {
                Value::Null => Slot::EmbeddedRef(None),
                data => Slot::EmbeddedRef(Some(self.wrap(field, data.clone())?)),
            },
            FieldKind::Collection { .. } => {
                Slot::EmbeddedCollection(self.wrap_all(field, data.clone())?)
            }
        };
        Ok(slot)
    }

    /// The value of the field `name`, fetching it from the server when the
    /// payload lacks it. Results are cached for the life of this object.
    ///
    /// Fields which cannot be fetched resolve to nothing (null, no object or
    /// an empty collection): fields that were selected in the query but are
    /// absent, fields of classes without ids, and fields of objects without an id.
    pub async fn resolve(&mut self, name: &str) -> Result<&Attribute<'s>, Error> {
        if !self.cache.contains_key(name) {
            let attribute = match self.lookup(name)? {
                Slot::Embedded(v) => Attribute::Value(v),
                Slot::EmbeddedRef(o) => Attribute::Object(o),
                Slot::EmbeddedCollection(c) => Attribute::Collection(c),
                Slot::NotLoaded => self.fetch(name).await?,
            };
            self.cache.insert(name.to_string(), attribute);
        }
        Ok(&self.cache[name])
    }

    async fn fetch(&self, name: &str) -> Result<Attribute<'s>, Error> {
        let field = self.field(name)?;
        let already_selected = match field.kind {
            FieldKind::Attribute { .. } => self.selected_attributes.contains(name),
            _ => self.reference_paths.contains_key(name),
        };
        let data = match self.id() {
            Some(id) if !already_selected && self.class.has_id() => {
                self.fetcher.fetch_field(self.class, id, field).await?
            }
            _ => None,
        };
        let data = data.unwrap_or(Value::Null);
        let attribute = match &field.kind {
            FieldKind::Attribute { .. } => Attribute::Value(data),
            FieldKind::Reference { .. } => match data {
                Value::Null => Attribute::Object(None),
                data => Attribute::Object(Some(self.wrap(field, data)?)),
            },
            FieldKind::Collection { .. } => Attribute::Collection(self.wrap_all(field, data)?),
        };
        Ok(attribute)
    }
}

impl Debug for ResultObject<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultObject")
            .field("class", &self.class.name)
            .field("data", &self.data)
            .finish()
    }
}

impl Display for ResultObject<'_> {
    /// Shows the scalar fields of the payload, e.g. `Gene(symbol = "eve", length = 1539)`
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.type_name())?;
        let scalars = self.data.iter().filter(|(k, v)| {
            !matches!(v, Value::Object(_) | Value::Array(_))
                && k.as_str() != "objectId"
                && k.as_str() != "class"
        });
        for (i, (k, v)) in scalars.enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} = {}", k, v)?;
        }
        f.write_str(")")
    }
}
