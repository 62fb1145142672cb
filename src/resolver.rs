use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

use crate::declaration::{DeclKind, Declaration, DeclarationIndex, FieldDescriptor, TypeExpr};
use crate::error::{SourceLocation, Warning};
use crate::models::{basic_type, Schema};
use crate::golang::unquote;
use crate::parser::typed_value;

static DEFAULT_TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"default\((.*)\)").unwrap());
static SIZE_TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"size\((\d+)\)").unwrap());

/// Definition name: package name plus type name, e.g. `models.Object`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaKey(String);

impl SchemaKey {
    pub fn new(package: &str, type_name: &str) -> Self {
        SchemaKey(format!("{}.{}", package, type_name))
    }

    /// Key from a definition name as it appears in a `$ref`
    pub fn from_ref(name: &str) -> Self {
        SchemaKey(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn package(&self) -> &str {
        self.0.rsplit_once('.').map_or("", |(pkg, _)| pkg)
    }

    pub fn type_name(&self) -> &str {
        self.0.rsplit_once('.').map_or(&self.0, |(_, name)| name)
    }
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns Go type declarations into swagger definitions.
///
/// Every key is expanded at most once; a placeholder goes into the cache before
/// the fields are walked so self-referencing types terminate.
pub struct SchemaResolver<'a, I: DeclarationIndex + ?Sized> {
    index: &'a I,
    definitions: BTreeMap<SchemaKey, Schema>,
    warnings: Vec<Warning>,
    expansions: usize,
}

impl<'a, I: DeclarationIndex + ?Sized> SchemaResolver<'a, I> {
    pub fn new(index: &'a I) -> Self {
        Self {
            index,
            definitions: BTreeMap::new(),
            warnings: Vec::new(),
            expansions: 0,
        }
    }

    /// Number of distinct keys expanded so far
    pub fn expansions(&self) -> usize {
        self.expansions
    }

    pub fn definitions(&self) -> &BTreeMap<SchemaKey, Schema> {
        &self.definitions
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Consumes the resolver, returning definitions keyed by name and the warnings
    pub fn into_parts(self) -> (BTreeMap<String, Schema>, Vec<Warning>) {
        let definitions = self
            .definitions
            .into_iter()
            .map(|(key, schema)| (key.0, schema))
            .collect();
        (definitions, self.warnings)
    }

    fn package_name_of(&self, decl: &Declaration) -> String {
        self.index
            .package_name(&decl.package_id)
            .unwrap_or("main")
            .to_string()
    }

    /// Qualifies a type name written inside `context`, e.g. `Object` or `m.Object`
    pub fn key_for(&self, raw: &str, context: &Declaration) -> SchemaKey {
        match raw.split_once('.') {
            Some((qualifier, rest)) => {
                let name = rest.rsplit('.').next().unwrap_or(rest);
                let package = self
                    .index
                    .resolve_qualifier(context, qualifier)
                    .unwrap_or_else(|| qualifier.to_string());
                SchemaKey::new(&package, name)
            }
            None => SchemaKey::new(&self.package_name_of(context), raw),
        }
    }

    /// Returns a `$ref` to the definition for `key`, expanding it on first use.
    /// Unknown types get an object stub and a warning.
    pub fn resolve(&mut self, key: &SchemaKey, from: &SourceLocation) -> Schema {
        if self.definitions.contains_key(key) {
            return Schema::reference(key.as_str());
        }

        self.definitions.insert(
            key.clone(),
            Schema {
                title: Some(key.type_name().to_string()),
                ..Schema::object()
            },
        );
        self.expansions += 1;

        let index = self.index;
        let definition = match index.find_type(key.package(), key.type_name()) {
            Some(decl) => {
                debug!("Expanding definition {}", key);
                self.build_definition(decl)
            }
            None => {
                let warning = Warning::resolution(format!("Cannot find the object: {}", key))
                    .at(from.clone());
                warn!("{}", warning);
                self.warnings.push(warning);
                Schema {
                    title: Some(key.type_name().to_string()),
                    ..Schema::object()
                }
            }
        };

        self.definitions.insert(key.clone(), definition);
        Schema::reference(key.as_str())
    }

    /// Replaces every unqualified `$ref` under `schema` with a resolved one
    pub fn link(&mut self, schema: &mut Schema, context: &Declaration) {
        schema.walk_mut(&mut |node| {
            if let Some(raw) = node.ref_name().map(str::to_string) {
                let key = self.key_for(&raw, context);
                *node = self.resolve(&key, &context.location);
            }
        });
    }

    fn build_definition(&mut self, decl: &'a Declaration) -> Schema {
        let DeclKind::Type { underlying, .. } = &decl.kind else {
            return Schema::object();
        };

        let mut schema = match underlying {
            TypeExpr::Struct(fields) => {
                let mut schema = Schema::object();
                self.apply_fields(&mut schema, fields, decl);
                schema
            }
            TypeExpr::Named { .. } if basic_type(&underlying.to_string()).is_some() => {
                self.enum_schema(decl, &underlying.to_string())
            }
            other => self.schema_for(other, decl),
        };

        if schema.ref_.is_none() {
            schema.title = Some(decl.name.clone());
        }
        schema
    }

    // Named basic type; constants of that type become the enum
    fn enum_schema(&mut self, decl: &Declaration, basic: &str) -> Schema {
        let mut schema = match basic_type(basic) {
            Some((t, f)) => Schema::primitive(t, f),
            None => Schema::object(),
        };

        let consts = self.index.consts_of_type(&decl.package_id, &decl.name);
        for constant in &consts {
            if let DeclKind::Const { value, .. } = &constant.kind {
                schema
                    .enum_values
                    .push(serde_json::Value::from(format!("{} = {}", constant.name, value)));
            }
        }
        if let Some(DeclKind::Const { value, .. }) = consts.first().map(|c| &c.kind) {
            schema.example = typed_value(&unquote(value), basic);
        }

        schema
    }

    fn schema_for(&mut self, expr: &TypeExpr, context: &Declaration) -> Schema {
        match expr {
            TypeExpr::Pointer(inner) => self.schema_for(inner, context),
            TypeExpr::Slice(inner) => Schema::array(self.schema_for(inner, context)),
            TypeExpr::Map { value, .. } => Schema {
                additionalProperties: Some(Box::new(self.schema_for(value, context))),
                ..Schema::object()
            },
            TypeExpr::Struct(fields) => {
                let mut schema = Schema::object();
                self.apply_fields(&mut schema, fields, context);
                schema
            }
            TypeExpr::Interface | TypeExpr::Func | TypeExpr::Other(_) => Schema::object(),
            TypeExpr::Named { qualifier, name } => {
                if let Some((t, f)) = basic_type(&expr.to_string()) {
                    return Schema::primitive(t, f);
                }
                if qualifier.is_none() && matches!(name.as_str(), "any" | "error") {
                    return Schema::object();
                }
                let package = match qualifier {
                    Some(q) => self
                        .index
                        .resolve_qualifier(context, q)
                        .unwrap_or_else(|| q.clone()),
                    None => self.package_name_of(context),
                };
                self.resolve(&SchemaKey::new(&package, name), &context.location)
            }
        }
    }

    fn apply_fields(&mut self, schema: &mut Schema, fields: &[FieldDescriptor], context: &Declaration) {
        for field in fields {
            let json = field.tag("json");
            if json == Some("-") || field.tag("ignore").is_some_and(|v| !v.is_empty()) {
                continue;
            }
            let json_name = json
                .and_then(|j| j.split(',').next())
                .filter(|name| !name.is_empty());

            if field.embedded && json_name.is_none() {
                self.flatten_embedded(schema, field, context);
                continue;
            }

            let mut name = json_name.unwrap_or(&field.name).to_string();
            if let Some(thrift) = field
                .tag("thrift")
                .and_then(|t| t.split(',').next())
                .filter(|t| !t.is_empty())
            {
                name = thrift.to_string();
            }

            let mut property = self.schema_for(&field.type_ref, context);
            if property.ref_.is_none() {
                self.apply_field_tags(&mut property, field, context);
            }

            let required = matches!(field.tag("required"), Some(v) if !v.is_empty() && v != "false");
            if required && !schema.required.contains(&name) {
                schema.required.push(name.clone());
            }
            schema.properties.insert(name, property);
        }
    }

    fn apply_field_tags(&mut self, property: &mut Schema, field: &FieldDescriptor, context: &Declaration) {
        if let Some(description) = field.tag("description") {
            property.description = Some(description.to_string());
        }

        let value_type = property
            .type_
            .clone()
            .unwrap_or_else(|| "string".to_string());

        if let Some(cap) = field.tag("doc").and_then(|doc| DEFAULT_TAG_REGEX.captures(doc)) {
            property.default = Some(self.typed_or_warn(&cap[1], &value_type, field, context));
        }

        if let Some(example) = field.tag("example") {
            let value = if value_type == "array" {
                let item_type = property
                    .items
                    .as_ref()
                    .and_then(|items| items.type_.clone())
                    .unwrap_or_else(|| "string".to_string());
                serde_json::Value::Array(
                    example
                        .split(',')
                        .map(|item| self.typed_or_warn(item, &item_type, field, context))
                        .collect(),
                )
            } else {
                self.typed_or_warn(example, &value_type, field, context)
            };
            property.example = Some(value);
        }

        if value_type == "string" {
            if let Some(cap) = field.tag("orm").and_then(|orm| SIZE_TAG_REGEX.captures(orm)) {
                property.maxLength = cap[1].parse().ok();
            }
        }
    }

    fn typed_or_warn(
        &mut self,
        raw: &str,
        type_name: &str,
        field: &FieldDescriptor,
        context: &Declaration,
    ) -> serde_json::Value {
        typed_value(raw, type_name).unwrap_or_else(|| {
            self.warnings.push(
                Warning::parse(format!(
                    "Invalid {} value {:?} on field {}",
                    type_name, raw, field.name
                ))
                .at(context.location.clone()),
            );
            serde_json::Value::from(raw)
        })
    }

    // Promotes the embedded type's properties into the outer schema
    fn flatten_embedded(&mut self, schema: &mut Schema, field: &FieldDescriptor, context: &Declaration) {
        let target = match field.type_ref.deref() {
            named @ TypeExpr::Named { .. } => self.schema_for(named, context),
            _ => return,
        };
        let Some(name) = target.ref_name() else {
            debug!("Not flattening embedded non-struct {}", field.type_ref);
            return;
        };
        let Some(embedded) = self.definitions.get(&SchemaKey::from_ref(name)) else {
            return;
        };

        for (prop_name, prop) in &embedded.properties {
            schema
                .properties
                .entry(prop_name.clone())
                .or_insert_with(|| prop.clone());
        }
        for required in &embedded.required {
            if !schema.required.contains(required) {
                schema.required.push(required.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{PackageIndex, SourceFile};
    use crate::golang::parse_source;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn source(path: &str, import_path: &str, src: &str) -> SourceFile {
        parse_source(&PathBuf::from(path), src, import_path).unwrap()
    }

    fn models_index() -> PackageIndex {
        PackageIndex::new(vec![
            source(
                "models/object.go",
                "example.com/app/models",
                r#"
package models

import "time"

type Base struct {
    Id      int64     `json:"id" required:"true"`
    Created time.Time `json:"created"`
}

type Object struct {
    Base
    Score      int64             `json:"score" doc:"default(10)" example:"42"`
    PlayerName string            `json:"playerName,omitempty" orm:"size(64)" description:"who played"`
    Secret     string            `json:"-"`
    Labels     map[string]string `json:"labels"`
    Owner      *User             `json:"owner"`
    Status     Status            `json:"status"`
    Rename     string            `thrift:"renamed,1"`
}

type User struct {
    Name    string  `json:"name"`
    Friends []*User `json:"friends"`
}

type Status int

const (
    StatusActive  Status = 1
    StatusBlocked Status = 2
)
"#,
            ),
            source(
                "controllers/object.go",
                "example.com/app/controllers",
                r#"
package controllers

import m "example.com/app/models"

type ObjectController struct{}
"#,
            ),
        ])
    }

    fn controller(index: &PackageIndex) -> &Declaration {
        index
            .list_declarations("example.com/app/controllers")
            .into_iter()
            .next()
            .unwrap()
    }

    #[test]
    fn test_resolve_struct_definition() {
        let index = models_index();
        let mut resolver = SchemaResolver::new(&index);
        let ctx = controller(&index);

        let key = resolver.key_for("m.Object", ctx);
        assert_eq!(key.as_str(), "models.Object");
        let reference = resolver.resolve(&key, &ctx.location);
        assert_eq!(reference.ref_name(), Some("models.Object"));

        let object = &resolver.definitions()[&key];
        assert_eq!(object.title.as_deref(), Some("Object"));
        let props: Vec<_> = object.properties.keys().map(String::as_str).collect();
        assert_eq!(
            props,
            vec!["created", "id", "labels", "owner", "playerName", "renamed", "score", "status"]
        );
        assert_eq!(object.required, vec!["id"]);

        let score = &object.properties["score"];
        assert_eq!(score.default, Some(serde_json::json!(10)));
        assert_eq!(score.example, Some(serde_json::json!(42)));

        let player = &object.properties["playerName"];
        assert_eq!(player.maxLength, Some(64));
        assert_eq!(player.description.as_deref(), Some("who played"));

        assert_eq!(object.properties["created"].format.as_deref(), Some("datetime"));
        assert_eq!(
            object.properties["labels"]
                .additionalProperties
                .as_ref()
                .and_then(|s| s.type_.as_deref()),
            Some("string")
        );
        assert_eq!(object.properties["owner"].ref_name(), Some("models.User"));
        assert!(resolver.warnings().is_empty());
    }

    #[test]
    fn test_enum_definition() {
        let index = models_index();
        let mut resolver = SchemaResolver::new(&index);
        let ctx = controller(&index);

        resolver.resolve(&SchemaKey::new("models", "Status"), &ctx.location);
        let status = &resolver.definitions()[&SchemaKey::new("models", "Status")];
        assert_eq!(status.type_.as_deref(), Some("integer"));
        assert_eq!(
            status.enum_values,
            vec![
                serde_json::json!("StatusActive = 1"),
                serde_json::json!("StatusBlocked = 2")
            ]
        );
        assert_eq!(status.example, Some(serde_json::json!(1)));
    }

    #[test]
    fn test_self_reference_terminates() {
        let index = models_index();
        let mut resolver = SchemaResolver::new(&index);
        let ctx = controller(&index);

        let key = SchemaKey::new("models", "User");
        resolver.resolve(&key, &ctx.location);
        let user = &resolver.definitions()[&key];
        let friends = &user.properties["friends"];
        assert_eq!(
            friends.items.as_ref().and_then(|s| s.ref_name()),
            Some("models.User")
        );
        assert_eq!(resolver.expansions(), 1);
    }

    #[test]
    fn test_resolve_is_memoized() {
        let index = models_index();
        let mut resolver = SchemaResolver::new(&index);
        let ctx = controller(&index);

        let key = SchemaKey::new("models", "Object");
        let first = resolver.resolve(&key, &ctx.location);
        let expanded = resolver.expansions();
        let second = resolver.resolve(&key, &ctx.location);

        assert_eq!(first, second);
        assert_eq!(resolver.expansions(), expanded);
    }

    #[test]
    fn test_unknown_type_gets_stub_and_warning() {
        let index = models_index();
        let mut resolver = SchemaResolver::new(&index);
        let ctx = controller(&index);

        let key = resolver.key_for("Missing", ctx);
        assert_eq!(key.as_str(), "controllers.Missing");
        resolver.resolve(&key, &ctx.location);

        assert_eq!(resolver.definitions()[&key].type_.as_deref(), Some("object"));
        assert_eq!(resolver.warnings().len(), 1);
        assert!(resolver.warnings()[0].message.contains("controllers.Missing"));
    }

    #[test]
    fn test_link_rewrites_annotation_refs() {
        let index = models_index();
        let mut resolver = SchemaResolver::new(&index);
        let ctx = controller(&index);

        let mut schema = Schema::array(Schema::reference("m.User"));
        resolver.link(&mut schema, ctx);
        assert_eq!(
            schema.items.as_ref().and_then(|s| s.ref_name()),
            Some("models.User")
        );
    }
}
