//! The data model of a mine, as far as result objects need it: which classes
//! exist and whether each of their fields is an attribute, a reference or a
//! collection.

use crate::errors::{Error, ProtocolError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Attribute { type_name: String },
    Reference { referenced_type: String },
    Collection { referenced_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, FieldKind::Attribute { .. })
    }

    /// Class of the objects a reference or collection points to.
    pub fn referenced_type(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Attribute { .. } => None,
            FieldKind::Reference { referenced_type } | FieldKind::Collection { referenced_type } => {
                Some(referenced_type)
            }
        }
    }
}

/// A class of the data model, with inherited fields merged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub name: String,
    pub fields: BTreeMap<String, Field>,
}

impl ClassDescriptor {
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Field> + '_ {
        self.fields.values().filter(|f| f.is_attribute())
    }

    /// Objects of classes with an `id` field can be looked up again on the server.
    pub fn has_id(&self) -> bool {
        self.fields.contains_key("id")
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    classes: HashMap<String, ClassDescriptor>,
}

#[derive(Deserialize)]
struct ModelDocument {
    model: RawModel,
}

#[derive(Deserialize)]
struct RawModel {
    name: String,
    classes: HashMap<String, RawClass>,
}

#[derive(Deserialize)]
struct RawClass {
    #[serde(default)]
    extends: Vec<String>,
    #[serde(default)]
    attributes: BTreeMap<String, RawAttribute>,
    #[serde(default)]
    references: BTreeMap<String, RawReference>,
    #[serde(default)]
    collections: BTreeMap<String, RawReference>,
}

#[derive(Deserialize)]
struct RawAttribute {
    #[serde(rename = "type")]
    type_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReference {
    referenced_type: String,
}

impl Model {
    /// Parse the JSON document served at `/model?format=json`.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let doc: ModelDocument =
            serde_json::from_str(text).map_err(|source| ProtocolError::BadEnvelope {
                text: text.chars().take(200).collect(),
                source,
            })?;
        let raw = doc.model;
        let classes = raw
            .classes
            .keys()
            .map(|name| {
                let mut fields = BTreeMap::new();
                collect_fields(&raw.classes, name, &mut fields, &mut HashSet::new());
                let cd = ClassDescriptor {
                    name: name.clone(),
                    fields,
                };
                (name.clone(), cd)
            })
            .collect();
        Ok(Self {
            name: raw.name,
            classes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_class(&self, name: &str) -> Result<&ClassDescriptor, Error> {
        self.classes
            .get(name)
            .ok_or_else(|| Error::UnknownClass(name.to_string()))
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDescriptor> + '_ {
        self.classes.values()
    }
}

/// Fields declared on a subclass shadow those inherited from its parents.
fn collect_fields<'a>(
    classes: &'a HashMap<String, RawClass>,
    name: &'a str,
    fields: &mut BTreeMap<String, Field>,
    visited: &mut HashSet<&'a str>,
) {
    if !visited.insert(name) {
        return;
    }
    let Some(class) = classes.get(name) else {
        return;
    };
    for parent in &class.extends {
        collect_fields(classes, parent, fields, visited);
    }
    let attributes = class.attributes.iter().map(|(n, a)| {
        let kind = FieldKind::Attribute {
            type_name: a.type_name.clone(),
        };
        (n, kind)
    });
    let references = class.references.iter().map(|(n, r)| {
        let kind = FieldKind::Reference {
            referenced_type: r.referenced_type.clone(),
        };
        (n, kind)
    });
    let collections = class.collections.iter().map(|(n, r)| {
        let kind = FieldKind::Collection {
            referenced_type: r.referenced_type.clone(),
        };
        (n, kind)
    });
    for (n, kind) in attributes.chain(references).chain(collections) {
        let field = Field {
            name: n.clone(),
            kind,
        };
        fields.insert(n.clone(), field);
    }
}
