#![allow(non_snake_case)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix of every schema reference emitted into the document
pub const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Security requirement: scheme name to required scopes
pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

/// Represents a complete Swagger 2.0 document
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Document {
    pub swagger: String,
    pub info: Info,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basePath: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub schemes: Vec<String>,
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub definitions: BTreeMap<String, Schema>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub securityDefinitions: BTreeMap<String, SecurityScheme>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub security: Vec<SecurityRequirement>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<Tag>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            swagger: "2.0".to_string(),
            info: Info::default(),
            host: None,
            basePath: None,
            schemes: Vec::new(),
            paths: BTreeMap::new(),
            definitions: BTreeMap::new(),
            securityDefinitions: BTreeMap::new(),
            security: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// Information about the API
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Info {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termsOfService: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
}

/// Contact information for the API
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Contact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// License information for the API
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct License {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Tag information for API operations
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Tag {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single path item with all its operations
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
}

impl PathItem {
    fn slot(&mut self, method: &str) -> Option<&mut Option<Operation>> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(&mut self.get),
            "PUT" => Some(&mut self.put),
            "POST" => Some(&mut self.post),
            "DELETE" => Some(&mut self.delete),
            "OPTIONS" => Some(&mut self.options),
            "HEAD" => Some(&mut self.head),
            "PATCH" => Some(&mut self.patch),
            _ => None,
        }
    }

    /// Whether `method` is one of the verbs a path item can hold
    pub fn supports(method: &str) -> bool {
        PathItem::default().slot(method).is_some()
    }

    /// Stores an operation under the given HTTP method and returns the one it replaced.
    /// Unknown methods are ignored.
    pub fn set_operation(&mut self, method: &str, operation: Operation) -> Option<Operation> {
        self.slot(method).and_then(|slot| slot.replace(operation))
    }

    pub fn operation(&self, method: &str) -> Option<&Operation> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => self.get.as_ref(),
            "PUT" => self.put.as_ref(),
            "POST" => self.post.as_ref(),
            "DELETE" => self.delete.as_ref(),
            "OPTIONS" => self.options.as_ref(),
            "HEAD" => self.head.as_ref(),
            "PATCH" => self.patch.as_ref(),
            _ => None,
        }
    }

    /// All operations present on this path in document order
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        [
            &self.get,
            &self.put,
            &self.post,
            &self.delete,
            &self.options,
            &self.head,
            &self.patch,
        ]
        .into_iter()
        .filter_map(|op| op.as_ref())
    }
}

/// An operation (endpoint) of the API
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Operation {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operationId: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub consumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub produces: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub responses: BTreeMap<String, Response>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub security: Vec<SecurityRequirement>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub deprecated: bool,
}

impl Operation {
    /// Every schema hanging off this operation, parameters first
    pub fn schemas_mut(&mut self) -> impl Iterator<Item = &mut Schema> {
        let params = self.parameters.iter_mut().filter_map(|p| p.schema.as_mut());
        let responses = self.responses.values_mut().filter_map(|r| r.schema.as_mut());
        params.chain(responses)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        let params = self.parameters.iter().filter_map(|p| p.schema.as_ref());
        let responses = self.responses.values().filter_map(|r| r.schema.as_ref());
        params.chain(responses)
    }
}

/// Parameter for an operation.
///
/// Exactly one of `type_` (a primitive, possibly `array` with `items`) or `schema` is set.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub in_type: String, // query, header, path, formData, body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub required: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<ParameterItems>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl Parameter {
    pub fn has_single_type(&self) -> bool {
        self.type_.is_some() != self.schema.is_some()
    }
}

/// Items of a non-body array parameter
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ParameterItems {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// API response
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
}

/// Schema node. A `$ref` node carries no inline properties.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Schema {
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub ref_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub properties: BTreeMap<String, Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additionalProperties: Option<Box<Schema>>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty", default)]
    pub enum_values: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxLength: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
}

impl Schema {
    /// A `$ref` node pointing at a definition
    pub fn reference(name: &str) -> Self {
        Self {
            ref_: Some(format!("{}{}", DEFINITIONS_PREFIX, name)),
            ..Default::default()
        }
    }

    pub fn primitive(type_: &str, format: Option<&str>) -> Self {
        Self {
            type_: Some(type_.to_string()),
            format: format.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn array(items: Schema) -> Self {
        Self {
            type_: Some("array".to_string()),
            items: Some(Box::new(items)),
            ..Default::default()
        }
    }

    pub fn object() -> Self {
        Self::primitive("object", None)
    }

    /// Definition name this node points at, if it is a reference
    pub fn ref_name(&self) -> Option<&str> {
        self.ref_
            .as_deref()
            .map(|r| r.strip_prefix(DEFINITIONS_PREFIX).unwrap_or(r))
    }

    /// Calls `visit` for every reference reachable inside this node (not following definitions)
    pub fn for_each_ref<'a>(&'a self, visit: &mut impl FnMut(&'a str)) {
        if let Some(name) = self.ref_name() {
            visit(name);
        }
        for property in self.properties.values() {
            property.for_each_ref(visit);
        }
        if let Some(items) = &self.items {
            items.for_each_ref(visit);
        }
        if let Some(additional) = &self.additionalProperties {
            additional.for_each_ref(visit);
        }
    }

    /// Mutable walk over this node and every nested node
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Schema)) {
        visit(self);
        for property in self.properties.values_mut() {
            property.walk_mut(visit);
        }
        if let Some(items) = &mut self.items {
            items.walk_mut(visit);
        }
        if let Some(additional) = &mut self.additionalProperties {
            additional.walk_mut(visit);
        }
    }
}

/// Security scheme object
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "in", skip_serializing_if = "Option::is_none")]
    pub in_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorizationUrl: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub scopes: BTreeMap<String, String>,
}

// Go basic types and the builtin objects swagger knows how to describe
pub fn basic_type(go_type: &str) -> Option<(&'static str, Option<&'static str>)> {
    let mapped = match go_type {
        "bool" => ("boolean", None),
        "uint" | "uint8" | "uint16" | "uint32" => ("integer", Some("int32")),
        "int8" | "int16" | "int32" => ("integer", Some("int32")),
        "uint64" | "int" | "int64" | "uintptr" => ("integer", Some("int64")),
        "float32" | "complex64" => ("number", Some("float")),
        "float64" | "complex128" => ("number", Some("double")),
        "string" => ("string", None),
        "byte" | "rune" => ("string", Some("byte")),
        "time.Time" => ("string", Some("datetime")),
        "json.RawMessage" => ("object", None),
        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_item_replaces_operation() {
        let mut item = PathItem::default();
        let first = Operation {
            summary: Some("first".to_string()),
            ..Default::default()
        };
        let second = Operation {
            summary: Some("second".to_string()),
            ..Default::default()
        };

        assert!(item.set_operation("get", first).is_none());
        let replaced = item.set_operation("GET", second).unwrap();
        assert_eq!(replaced.summary.as_deref(), Some("first"));
        assert_eq!(item.get.unwrap().summary.as_deref(), Some("second"));
    }

    #[test]
    fn test_unknown_method_is_ignored() {
        let mut item = PathItem::default();
        assert!(item.set_operation("TRACE", Operation::default()).is_none());
        assert_eq!(item.operations().count(), 0);
        assert!(!PathItem::supports("CONNECT"));
    }

    #[test]
    fn test_collects_nested_refs() {
        let mut schema = Schema::object();
        schema
            .properties
            .insert("owner".to_string(), Schema::reference("models.User"));
        schema.properties.insert(
            "tags".to_string(),
            Schema::array(Schema::reference("models.Tag")),
        );

        let mut refs = Vec::new();
        schema.for_each_ref(&mut |name| refs.push(name.to_string()));
        assert_eq!(refs, vec!["models.User", "models.Tag"]);
    }

    #[test]
    fn test_document_serializes_swagger_fields() {
        let doc = Document {
            basePath: Some("/v1".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["swagger"], "2.0");
        assert_eq!(json["basePath"], "/v1");
        assert!(json.get("definitions").is_none());
    }

    #[test]
    fn test_basic_type_table() {
        assert_eq!(basic_type("int"), Some(("integer", Some("int64"))));
        assert_eq!(basic_type("uint8"), Some(("integer", Some("int32"))));
        assert_eq!(basic_type("time.Time"), Some(("string", Some("datetime"))));
        assert_eq!(basic_type("models.User"), None);
    }
}
