use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{DocsError, Result, SourceLocation, Warning};
use crate::models::{Document, PathItem, Schema};
use crate::parser::DocumentMeta;
use crate::router::RoutedOperation;

/// Output file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            OutputFormat::Json => "swagger.json",
            OutputFormat::Yaml => "swagger.yml",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(format!("Unknown output type: {}", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

/// Builds the final swagger document from routed operations and definitions
pub struct SpecAssembler {
    meta: DocumentMeta,
}

impl SpecAssembler {
    pub fn new(meta: DocumentMeta) -> Self {
        Self { meta }
    }

    /// Assembles the document.
    ///
    /// A later operation on the same path and method replaces the earlier one
    /// with a warning. Only definitions reachable from some operation are kept.
    pub fn assemble(
        &self,
        routes: Vec<RoutedOperation>,
        definitions: BTreeMap<String, Schema>,
    ) -> (Document, Vec<Warning>) {
        let mut warnings = Vec::new();
        let mut doc = Document {
            info: self.meta.info.clone(),
            host: self.meta.host.clone(),
            basePath: self.meta.base_path.clone(),
            schemes: self.meta.schemes.clone(),
            securityDefinitions: self.meta.security_definitions.clone(),
            security: self.meta.security.clone(),
            tags: self.meta.tags.clone(),
            ..Default::default()
        };

        let mut sources: BTreeMap<(String, String), SourceLocation> = BTreeMap::new();
        for route in routes {
            if !PathItem::supports(&route.method) {
                let warning = Warning::topology(format!(
                    "Unsupported HTTP method {} for {}",
                    route.method, route.path
                ))
                .at(route.source);
                warn!("{}", warning);
                warnings.push(warning);
                continue;
            }

            let item = doc.paths.entry(route.path.clone()).or_default();
            if item.set_operation(&route.method, route.operation).is_some() {
                let previous = sources
                    .get(&(route.path.clone(), route.method.clone()))
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                let warning = Warning::topology(format!(
                    "Duplicate route {} {}, replacing the operation from {}",
                    route.method, route.path, previous
                ))
                .at(route.source.clone());
                warn!("{}", warning);
                warnings.push(warning);
            }
            sources.insert((route.path, route.method), route.source);
        }

        doc.definitions = reachable_definitions(&doc, definitions);
        info!(
            "Assembled {} paths and {} definitions",
            doc.paths.len(),
            doc.definitions.len()
        );

        (doc, warnings)
    }
}

/// Drops every definition no operation refers to, directly or transitively
fn reachable_definitions(
    doc: &Document,
    mut definitions: BTreeMap<String, Schema>,
) -> BTreeMap<String, Schema> {
    let mut pending: Vec<String> = Vec::new();
    for item in doc.paths.values() {
        for operation in item.operations() {
            for schema in operation.schemas() {
                schema.for_each_ref(&mut |name| pending.push(name.to_string()));
            }
        }
    }

    let mut reached = BTreeSet::new();
    while let Some(name) = pending.pop() {
        if !reached.insert(name.clone()) {
            continue;
        }
        if let Some(schema) = definitions.get(&name) {
            schema.for_each_ref(&mut |next| pending.push(next.to_string()));
        }
    }

    let before = definitions.len();
    definitions.retain(|name, _| reached.contains(name));
    debug!(
        "Kept {} of {} definitions after reachability sweep",
        definitions.len(),
        before
    );
    definitions
}

/// Serializes the document as JSON with 4-space indentation
pub fn to_json(doc: &Document) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn to_yaml(doc: &Document) -> Result<String> {
    Ok(serde_yaml::to_string(doc)?)
}

/// Writes the requested formats into `output_dir`.
///
/// Every format is rendered before anything touches the disk, so a
/// serialization failure leaves no partial output behind.
pub fn write_documents(
    doc: &Document,
    output_dir: &Path,
    formats: &[OutputFormat],
) -> Result<Vec<PathBuf>> {
    let mut rendered = Vec::new();
    for format in formats {
        let content = match format {
            OutputFormat::Json => to_json(doc)?,
            OutputFormat::Yaml => to_yaml(doc)?,
        };
        rendered.push((format.file_name(), content));
    }

    // Create output directory if it doesn't exist
    fs::create_dir_all(output_dir).map_err(|source| DocsError::OutputDir {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for (file_name, content) in rendered {
        let path = output_dir.join(file_name);
        write_file(&path, &content)?;
        info!("Generated file: {:?}", path);
        written.push(path);
    }

    Ok(written)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    let to_error = |source| DocsError::OutputWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::create(path).map_err(to_error)?;
    file.write_all(content.as_bytes()).map_err(to_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Info, Operation, Response};
    use crate::router::ControllerKey;
    use tempfile::tempdir;

    fn route(path: &str, method: &str, response_ref: Option<&str>, line: usize) -> RoutedOperation {
        let mut operation = Operation::default();
        operation.responses.insert(
            "200".to_string(),
            Response {
                description: "ok".to_string(),
                schema: response_ref.map(Schema::reference),
            },
        );
        RoutedOperation {
            path: path.to_string(),
            method: method.to_string(),
            operation,
            source: SourceLocation {
                file: PathBuf::from("controllers/object.go"),
                line,
                symbol: format!("ObjectController.M{}", line),
            },
            controller: ControllerKey::new("example.com/app/controllers", "ObjectController"),
        }
    }

    fn meta() -> DocumentMeta {
        DocumentMeta {
            info: Info {
                title: "demo".to_string(),
                version: "1.0.0".to_string(),
                ..Default::default()
            },
            base_path: Some("/v1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_route_last_wins() {
        let assembler = SpecAssembler::new(meta());
        let (doc, warnings) = assembler.assemble(
            vec![
                route("/object", "GET", None, 10),
                route("/object", "GET", Some("models.Object"), 20),
            ],
            BTreeMap::new(),
        );

        let get = doc.paths["/object"].get.as_ref().unwrap();
        assert!(get.responses["200"].schema.is_some());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("controllers/object.go:10"));
        assert_eq!(warnings[0].source.as_ref().unwrap().line, 20);
    }

    #[test]
    fn test_unreachable_definitions_are_dropped() {
        let mut definitions = BTreeMap::new();
        let mut object = Schema::object();
        object
            .properties
            .insert("owner".to_string(), Schema::reference("models.User"));
        definitions.insert("models.Object".to_string(), object);
        definitions.insert("models.User".to_string(), Schema::object());
        definitions.insert("models.Unused".to_string(), Schema::object());

        let (doc, _) = SpecAssembler::new(meta()).assemble(
            vec![route("/object", "POST", Some("models.Object"), 1)],
            definitions,
        );

        let names: Vec<_> = doc.definitions.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["models.Object", "models.User"]);
        assert_eq!(doc.basePath.as_deref(), Some("/v1"));
    }

    #[test]
    fn test_json_uses_four_space_indent() {
        let (doc, _) = SpecAssembler::new(meta()).assemble(Vec::new(), BTreeMap::new());
        let json = to_json(&doc).unwrap();
        assert!(json.starts_with("{\n    \"swagger\": \"2.0\""));
    }

    #[test]
    fn test_write_documents() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("swagger");
        let (doc, _) = SpecAssembler::new(meta()).assemble(
            vec![route("/object", "GET", None, 1)],
            BTreeMap::new(),
        );

        let written =
            write_documents(&doc, &out, &[OutputFormat::Json, OutputFormat::Yaml]).unwrap();
        assert_eq!(written, vec![out.join("swagger.json"), out.join("swagger.yml")]);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        let yaml: serde_json::Value =
            serde_yaml::from_str(&fs::read_to_string(&written[1]).unwrap()).unwrap();
        assert_eq!(json, yaml);
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("yml".parse::<OutputFormat>(), Ok(OutputFormat::Yaml));
        assert!("go".parse::<OutputFormat>().is_err());
    }
}
