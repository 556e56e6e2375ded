//! Cached documents.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Name of the identity field.
pub const ID_FIELD: &str = "_id";

/// A document mirrored from the server.
///
/// The `_id` is fixed at construction. It is never part of `fields`, so a
/// patch cannot rewrite it.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    id: String,
    fields: Map<String, Value>,
}

impl Document {
    /// Create a document, discarding any `_id` entry in `fields`.
    #[must_use]
    pub fn new(id: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        fields.shift_remove(ID_FIELD);
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a document from a JSON object with a string `_id`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ddpwire::cache::Document;
    /// use serde_json::json;
    ///
    /// let doc = Document::from_value(json!({"_id": "t1", "title": "x"})).expect("object");
    /// assert_eq!(doc.id(), "t1");
    /// assert_eq!(doc.get("title"), Some(&json!("x")));
    /// ```
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let Some(Value::String(id)) = fields.shift_remove(ID_FIELD) else {
            return None;
        };
        Some(Self { id, fields })
    }

    /// Document identity.
    #[must_use]
    pub fn id(&self) -> &str { &self.id }

    /// All fields except `_id`, in arrival order.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> { &self.fields }

    /// Look up one field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> { self.fields.get(field) }

    /// JSON object including `_id`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert(ID_FIELD.to_owned(), Value::String(self.id.clone()));
        object.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(object)
    }

    /// Decode into an application type. `_id` is visible to the target.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the document does not fit `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_value())
    }

    pub(crate) fn into_parts(self) -> (String, Map<String, Value>) { (self.id, self.fields) }

    /// Merge `fields` over the document and drop every name in `cleared`.
    pub(crate) fn apply(&mut self, fields: Option<&Map<String, Value>>, cleared: &[String]) {
        if let Some(fields) = fields {
            for (name, value) in fields {
                if name != ID_FIELD {
                    self.fields.insert(name.clone(), value.clone());
                }
            }
        }
        for name in cleared {
            self.fields.shift_remove(name);
        }
    }
}
