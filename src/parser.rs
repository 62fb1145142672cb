use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use url::Url;

use crate::declaration::{FieldDescriptor, TypeExpr};
use crate::error::Warning;
use crate::models::{
    basic_type, Contact, Info, License, Operation, Parameter, ParameterItems, Response, Schema,
    SecurityRequirement, SecurityScheme, Tag,
};

static STATUS_CODE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{3}|default)$").unwrap());

const SWAGGER_TYPES: [&str; 6] = ["string", "number", "integer", "boolean", "array", "file"];
const PARAM_LOCATIONS: [&str; 5] = ["query", "header", "path", "formData", "body"];

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationType {
    // Document level
    ApiVersion,
    TermsOfService,
    Contact,
    ContactName,
    ContactUrl,
    License,
    LicenseUrl,
    Schemes,
    Host,
    SecurityDefinition,

    // Shared by documents and operations
    Title,
    Description,
    Security,

    // Operation level
    Summary,
    Param,
    Success,
    Failure,
    Router,
    Accept,
    Deprecated,

    Unknown(String),
}

impl From<&str> for AnnotationType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "apiversion" => Self::ApiVersion,
            "termsofserviceurl" => Self::TermsOfService,
            "contact" => Self::Contact,
            "name" => Self::ContactName,
            "url" => Self::ContactUrl,
            "license" => Self::License,
            "licenseurl" => Self::LicenseUrl,
            "schemes" => Self::Schemes,
            "host" => Self::Host,
            "securitydefinition" => Self::SecurityDefinition,
            "title" => Self::Title,
            "description" => Self::Description,
            "security" => Self::Security,
            "summary" => Self::Summary,
            "param" => Self::Param,
            "success" => Self::Success,
            "failure" => Self::Failure,
            "router" => Self::Router,
            "accept" => Self::Accept,
            "deprecated" => Self::Deprecated,
            _ => Self::Unknown(s.to_string()),
        }
    }
}

/// Splits `@Tag rest of line` into the tag and its trimmed argument
fn split_annotation(line: &str) -> Option<(AnnotationType, &str)> {
    let line = line.trim().trim_start_matches("//").trim_start();
    let body = line.strip_prefix('@')?;
    let (tag, rest) = match body.find(char::is_whitespace) {
        Some(pos) => (&body[..pos], body[pos..].trim()),
        None => (body, ""),
    };
    Some((AnnotationType::from(tag), rest))
}

/// First whitespace-delimited word and the trimmed remainder
fn next_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim()),
        None => (s, ""),
    }
}

fn trim_quotes(s: &str) -> String {
    s.trim_matches(|c: char| c == '"' || c == ' ').to_string()
}

/// Tokenizes annotation arguments on whitespace, treating double-quoted runs as one token
pub fn tokenize_params(input: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut quoted = false;

    for c in input.chars() {
        if c.is_whitespace() && !quoted {
            if started {
                params.push(std::mem::take(&mut current));
                started = false;
            }
            continue;
        }
        started = true;
        if c == '"' {
            quoted = !quoted;
            continue;
        }
        current.push(c);
    }
    if started {
        params.push(current);
    }

    params
}

/// Converts a literal to a JSON value of the given Go or swagger type.
/// Returns `None` when the literal doesn't parse as that type.
pub fn typed_value(raw: &str, type_name: &str) -> Option<serde_json::Value> {
    use serde_json::Value;

    let raw = raw.trim();
    match type_name {
        "int" | "int8" | "int16" | "int32" | "int64" | "integer" => {
            raw.parse::<i64>().ok().map(Value::from)
        }
        "uint" | "uint8" | "uint16" | "uint32" | "uint64" => raw.parse::<u64>().ok().map(Value::from),
        "bool" | "boolean" => raw.parse::<bool>().ok().map(Value::from),
        "float32" | "float64" | "number" => raw.parse::<f64>().ok().map(Value::from),
        _ => Some(Value::from(raw.trim_matches('"'))),
    }
}

/// Sets the type of a parameter from a Go or swagger type name.
///
/// Primitives become `type`/`format` (or `items` for arrays); body parameters
/// and qualified named types get a `schema` instead. Named types point at the
/// name as written and are qualified and resolved later. An unqualified unknown
/// type outside the body falls back to `string` and is reported.
pub fn set_param_type(param: &mut Parameter, type_name: &str) -> Option<Warning> {
    let (is_array, base) = match type_name.strip_prefix("[]") {
        Some(inner) => (true, inner),
        None => (false, type_name),
    };

    let primitive = if SWAGGER_TYPES.contains(&base) {
        Some((base, None))
    } else {
        basic_type(base)
    };

    param.type_ = None;
    param.format = None;
    param.items = None;
    param.schema = None;

    match primitive {
        Some((type_, format)) if param.in_type == "body" => {
            let schema = Schema::primitive(type_, format);
            param.schema = Some(if is_array { Schema::array(schema) } else { schema });
        }
        Some((type_, format)) if is_array => {
            param.type_ = Some("array".to_string());
            param.items = Some(ParameterItems {
                type_: Some(type_.to_string()),
                format: format.map(str::to_string),
            });
        }
        Some((type_, format)) => {
            param.type_ = Some(type_.to_string());
            param.format = format.map(str::to_string);
        }
        None if param.in_type != "body" && !base.contains('.') => {
            if is_array {
                param.type_ = Some("array".to_string());
                param.items = Some(ParameterItems {
                    type_: Some("string".to_string()),
                    format: None,
                });
            } else {
                param.type_ = Some("string".to_string());
            }
            return Some(Warning::parse(format!(
                "Unknown type {} for {} param {}, using string",
                base, param.in_type, param.name
            )));
        }
        None => {
            let schema = Schema::reference(base);
            param.schema = Some(if is_array { Schema::array(schema) } else { schema });
        }
    }
    None
}

/// Type name of a Go function parameter as written in `@Param ... auto`
pub fn go_param_type(type_ref: &TypeExpr) -> Option<String> {
    match type_ref {
        TypeExpr::Named { .. } => Some(type_ref.to_string()),
        TypeExpr::Pointer(inner) => go_param_type(inner),
        TypeExpr::Slice(inner) => go_param_type(inner).map(|t| format!("[]{}", t)),
        _ => None,
    }
}

/// Whether `:name` appears as a placeholder in a beego route
pub fn param_in_path(name: &str, route: &str) -> bool {
    let placeholder = format!(":{}", name);
    route.ends_with(&placeholder)
        || route.contains(&format!("{}/", placeholder))
        || route.contains(&format!("{}(", placeholder))
        || route.contains(&format!("{{{}}}", name))
        || route.contains(&format!("{{{}:", name))
}

/// Route declared by `@router`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteAnnotation {
    pub path: String,
    /// Uppercased HTTP methods, never empty
    pub methods: Vec<String>,
}

/// Link between an `@Param` and a Go function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamBinding {
    /// Index into the operation's parameters
    pub index: usize,
    pub func_param: String,
    /// Declared as `auto`, takes the Go parameter's type
    pub auto_type: bool,
}

/// Everything one method doc comment declares
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedComment {
    pub operation: Operation,
    pub route: Option<RouteAnnotation>,
    pub bindings: Vec<ParamBinding>,
}

impl ParsedComment {
    /// Applies the Go signature: types `auto` params and documents unbound parameters.
    pub fn apply_signature(&mut self, params: &[FieldDescriptor]) -> Vec<Warning> {
        let mut warnings = Vec::new();
        let mut unbound: Vec<&FieldDescriptor> = params.iter().collect();

        for binding in &self.bindings {
            let found = unbound
                .iter()
                .position(|p| p.name == binding.func_param)
                .map(|pos| unbound.remove(pos));
            if !binding.auto_type {
                continue;
            }
            let Some(param) = self.operation.parameters.get_mut(binding.index) else {
                continue;
            };
            match found.and_then(|p| go_param_type(&p.type_ref)) {
                Some(type_name) => warnings.extend(set_param_type(param, &type_name)),
                None => {
                    warnings.push(Warning::parse(format!(
                        "Cannot infer type of auto param {}, no matching function parameter {}",
                        param.name, binding.func_param
                    )));
                    param.type_ = Some("string".to_string());
                }
            }
        }

        let Some(route) = &self.route else {
            return warnings;
        };
        for field in unbound {
            let Some(type_name) = go_param_type(&field.type_ref) else {
                debug!("Skipping function parameter {} of type {}", field.name, field.type_ref);
                continue;
            };
            let mut param = Parameter {
                name: field.name.clone(),
                in_type: if param_in_path(&field.name, &route.path) {
                    "path".to_string()
                } else {
                    "query".to_string()
                },
                ..Default::default()
            };
            warnings.extend(set_param_type(&mut param, &type_name));
            self.operation.parameters.push(param);
        }

        warnings
    }
}

/// Document-level metadata read from the router file's comments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMeta {
    pub info: Info,
    pub host: Option<String>,
    pub schemes: Vec<String>,
    pub security_definitions: BTreeMap<String, SecurityScheme>,
    pub security: Vec<SecurityRequirement>,
    pub base_path: Option<String>,
    pub tags: Vec<Tag>,
}

/// Parser for beego-style swagger annotations
pub struct AnnotationParser;

impl Default for AnnotationParser {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses a method's doc comment into an operation.
    ///
    /// Malformed lines are reported and skipped; the rest of the comment still counts.
    pub fn parse(&self, doc: &str, controller: &str) -> (ParsedComment, Vec<Warning>) {
        let mut parsed = ParsedComment::default();
        let mut warnings = Vec::new();

        for line in doc.lines() {
            let Some((annotation, rest)) = split_annotation(line) else {
                continue;
            };

            match annotation {
                AnnotationType::Router => {
                    if let Some(route) = self.parse_router(rest, &mut warnings) {
                        parsed.route = Some(route);
                    }
                }
                AnnotationType::Title => {
                    parsed.operation.operationId = Some(format!("{}.{}", controller, rest));
                }
                AnnotationType::Description => {
                    let description = match parsed.operation.description.take() {
                        Some(existing) => format!("{}\n{}", existing, rest),
                        None => rest.to_string(),
                    };
                    parsed.operation.description = Some(description);
                }
                AnnotationType::Summary => parsed.operation.summary = Some(rest.to_string()),
                AnnotationType::Param => match self.parse_param(rest, &mut warnings) {
                    Ok((param, binding_name, auto_type)) => {
                        parsed.bindings.push(ParamBinding {
                            index: parsed.operation.parameters.len(),
                            func_param: binding_name,
                            auto_type,
                        });
                        parsed.operation.parameters.push(param);
                    }
                    Err(w) => warnings.push(w),
                },
                AnnotationType::Success => match self.parse_success(rest, &mut warnings) {
                    Some((code, response)) => {
                        parsed.operation.responses.insert(code, response);
                    }
                    None => warnings.push(Warning::parse(format!("Invalid @Success: {}", rest))),
                },
                AnnotationType::Failure => {
                    let (code, description) = next_word(rest);
                    if code.is_empty() {
                        warnings.push(Warning::parse("@Failure without a status code"));
                        continue;
                    }
                    parsed.operation.responses.insert(
                        code.to_string(),
                        Response {
                            description: trim_quotes(description),
                            schema: None,
                        },
                    );
                }
                AnnotationType::Deprecated => match rest {
                    "" | "true" => parsed.operation.deprecated = true,
                    "false" => parsed.operation.deprecated = false,
                    other => warnings.push(Warning::parse(format!(
                        "Invalid @Deprecated value: {}",
                        other
                    ))),
                },
                AnnotationType::Accept => self.parse_accept(rest, &mut parsed.operation, &mut warnings),
                AnnotationType::Security => match parse_security(rest) {
                    Some(requirement) => parsed.operation.security.push(requirement),
                    None => warnings.push(Warning::parse("No params for @Security specified")),
                },
                other => debug!("Ignoring {:?} in operation comment", other),
            }
        }

        (parsed, warnings)
    }

    /// `path [method,...]`; the bracketed list may contain spaces
    fn parse_router(&self, rest: &str, warnings: &mut Vec<Warning>) -> Option<RouteAnnotation> {
        let (path, after_path) = next_word(rest);
        if path.is_empty() {
            warnings.push(Warning::parse("@router without a path"));
            return None;
        }

        let (methods, leftover) = match after_path.strip_prefix('[') {
            Some(inner) => match inner.split_once(']') {
                Some((methods, leftover)) => (methods, leftover.trim()),
                None => {
                    warnings.push(Warning::parse(format!(
                        "Unterminated method list in @router {}",
                        rest
                    )));
                    (inner, "")
                }
            },
            None => next_word(after_path),
        };
        if !leftover.is_empty() {
            warnings.push(Warning::parse(format!(
                "Ignoring trailing text in @router {}: {}",
                path, leftover
            )));
        }

        let mut parsed: Vec<String> = methods
            .split(',')
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        if parsed.is_empty() {
            parsed.push("GET".to_string());
        }

        Some(RouteAnnotation {
            path: path.to_string(),
            methods: parsed,
        })
    }

    /// `name in type [default] [required] "description"`
    fn parse_param(
        &self,
        rest: &str,
        warnings: &mut Vec<Warning>,
    ) -> Result<(Parameter, String, bool), Warning> {
        let p = tokenize_params(rest);
        if p.len() < 4 {
            return Err(Warning::parse(format!(
                "@Param should have at least 4 params: {}",
                rest
            )));
        }

        let (name, func_param) = match p[0].split_once("=>") {
            Some((name, func_param)) => (name.to_string(), func_param.to_string()),
            None => (p[0].clone(), p[0].clone()),
        };

        let mut param = Parameter {
            name,
            ..Default::default()
        };

        param.in_type = if PARAM_LOCATIONS.contains(&p[1].as_str()) {
            p[1].clone()
        } else {
            warn!("Unknown param location {}, using query", p[1]);
            warnings.push(Warning::parse(format!(
                "Unknown param location: {}. Possible values are query, header, path, formData or body",
                p[1]
            )));
            "query".to_string()
        };

        let auto_type = p[2] == "auto";
        if auto_type {
            param.type_ = Some("string".to_string());
        } else {
            warnings.extend(set_param_type(&mut param, &p[2]));
        }

        match p.len() {
            5 => {
                param.required = p[3].parse().unwrap_or(false);
                param.description = Some(trim_quotes(&p[4]));
            }
            6 => {
                let type_name = param.type_.clone().unwrap_or_else(|| p[2].clone());
                param.default = typed_value(&p[3], &type_name);
                param.required = p[4].parse().unwrap_or(false);
                param.description = Some(trim_quotes(&p[5]));
            }
            _ => param.description = Some(trim_quotes(&p[3])),
        }

        if param.in_type == "path" {
            param.required = true;
        }

        Ok((param, func_param, auto_type))
    }

    /// `code {object|array} Type "description"` or `code "description"`
    fn parse_success(&self, rest: &str, warnings: &mut Vec<Warning>) -> Option<(String, Response)> {
        let (code, rest) = next_word(rest);
        if code.is_empty() {
            return None;
        }
        if !STATUS_CODE_REGEX.is_match(code) {
            warnings.push(Warning::parse(format!("Unusual response code in @Success: {}", code)));
        }

        let (shape, after_shape) = next_word(rest);
        let is_shape = shape.starts_with('{') && shape.ends_with('}');
        if !is_shape {
            return Some((
                code.to_string(),
                Response {
                    description: trim_quotes(rest),
                    schema: None,
                },
            ));
        }

        let mut is_array = match shape {
            "{object}" => false,
            "{array}" => true,
            other => {
                warnings.push(Warning::parse(format!(
                    "Unknown response shape {}, treating as {{object}}",
                    other
                )));
                false
            }
        };

        let (type_name, description) = next_word(after_shape);
        if type_name.is_empty() {
            warnings.push(Warning::parse(format!(
                "Schema must follow {} in @Success {}",
                shape, code
            )));
            return Some((
                code.to_string(),
                Response {
                    description: trim_quotes(description),
                    schema: None,
                },
            ));
        }

        let type_name = match type_name.strip_prefix("[]") {
            Some(inner) => {
                is_array = true;
                inner
            }
            None => type_name,
        };

        let schema = match basic_type(type_name) {
            Some((t, f)) => Schema::primitive(t, f),
            None if SWAGGER_TYPES.contains(&type_name) => Schema::primitive(type_name, None),
            None => Schema::reference(type_name),
        };

        Some((
            code.to_string(),
            Response {
                description: trim_quotes(description),
                schema: Some(if is_array { Schema::array(schema) } else { schema }),
            },
        ))
    }

    fn parse_accept(&self, rest: &str, operation: &mut Operation, warnings: &mut Vec<Warning>) {
        fn push_unique(list: &mut Vec<String>, value: &str) {
            if !list.iter().any(|v| v == value) {
                list.push(value.to_string());
            }
        }

        for accept in rest.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            let mime = match accept {
                "json" => "application/json",
                "xml" => "application/xml",
                "plain" => "text/plain",
                "html" => "text/html",
                "form" => {
                    push_unique(&mut operation.consumes, "multipart/form-data");
                    continue;
                }
                other => {
                    warnings.push(Warning::parse(format!("Unknown @Accept value: {}", other)));
                    continue;
                }
            };
            push_unique(&mut operation.consumes, mime);
            push_unique(&mut operation.produces, mime);
        }
    }

    /// Parses document-level annotations from every comment group of the router file
    pub fn parse_document_meta(&self, comments: &[String]) -> (DocumentMeta, Vec<Warning>) {
        let mut meta = DocumentMeta::default();
        let mut warnings = Vec::new();

        for line in comments.iter().flat_map(|c| c.lines()) {
            let Some((annotation, rest)) = split_annotation(line) else {
                continue;
            };
            let value = rest.to_string();

            match annotation {
                AnnotationType::ApiVersion => meta.info.version = value,
                AnnotationType::Title => meta.info.title = value,
                AnnotationType::Description => meta.info.description = Some(value),
                AnnotationType::TermsOfService => {
                    check_url("@TermsOfServiceUrl", &value, &mut warnings);
                    meta.info.termsOfService = Some(value);
                }
                AnnotationType::Contact => {
                    meta.info.contact.get_or_insert_with(Contact::default).email = Some(value)
                }
                AnnotationType::ContactName => {
                    meta.info.contact.get_or_insert_with(Contact::default).name = Some(value)
                }
                AnnotationType::ContactUrl => {
                    check_url("@URL", &value, &mut warnings);
                    meta.info.contact.get_or_insert_with(Contact::default).url = Some(value)
                }
                AnnotationType::License => {
                    meta.info.license.get_or_insert_with(License::default).name = value
                }
                AnnotationType::LicenseUrl => {
                    check_url("@LicenseUrl", &value, &mut warnings);
                    meta.info.license.get_or_insert_with(License::default).url = Some(value)
                }
                AnnotationType::Schemes => {
                    meta.schemes = value
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                AnnotationType::Host => self.apply_host(&value, &mut meta),
                AnnotationType::SecurityDefinition => match parse_security_definition(&value) {
                    Ok((name, scheme)) => {
                        meta.security_definitions.insert(name, scheme);
                    }
                    Err(w) => warnings.push(w),
                },
                AnnotationType::Security => match parse_security(&value) {
                    Some(requirement) => meta.security.push(requirement),
                    None => warnings.push(Warning::parse("No params for @Security specified")),
                },
                _ => {}
            }
        }

        (meta, warnings)
    }

    // A host given as a full URL also contributes its scheme
    fn apply_host(&self, value: &str, meta: &mut DocumentMeta) {
        if !value.contains("://") {
            meta.host = Some(value.to_string());
            return;
        }
        match Url::parse(value) {
            Ok(url) => {
                let host = match (url.host_str(), url.port()) {
                    (Some(host), Some(port)) => format!("{}:{}", host, port),
                    (Some(host), None) => host.to_string(),
                    (None, _) => value.to_string(),
                };
                meta.host = Some(host);
                if !meta.schemes.iter().any(|s| s == url.scheme()) {
                    meta.schemes.push(url.scheme().to_string());
                }
            }
            Err(e) => {
                debug!("Host {} is not a URL: {}", value, e);
                meta.host = Some(value.to_string());
            }
        }
    }
}

fn check_url(annotation: &str, value: &str, warnings: &mut Vec<Warning>) {
    if let Err(e) = Url::parse(value) {
        warnings.push(Warning::parse(format!(
            "{} is not a valid URL ({}): {}",
            annotation, e, value
        )));
    }
}

/// `@Security name [scope...]`
fn parse_security(rest: &str) -> Option<SecurityRequirement> {
    let p = tokenize_params(rest);
    let (name, scopes) = p.split_first()?;
    let mut requirement = SecurityRequirement::new();
    requirement.insert(name.clone(), scopes.to_vec());
    Some(requirement)
}

/// `@SecurityDefinition name type ...`
fn parse_security_definition(rest: &str) -> Result<(String, SecurityScheme), Warning> {
    let p = tokenize_params(rest);
    if p.len() < 2 {
        return Err(Warning::parse(format!(
            "Not enough params for @SecurityDefinition: {}",
            p.len()
        )));
    }

    let mut scheme = SecurityScheme {
        type_: p[1].clone(),
        ..Default::default()
    };

    match p[1].as_str() {
        "oauth2" => {
            if p.len() < 6 {
                return Err(Warning::parse(format!(
                    "Not enough params for oauth2: {}",
                    p.len()
                )));
            }
            if !["implicit", "password", "application", "accessCode"].contains(&p[3].as_str()) {
                return Err(Warning::parse(format!(
                    "Unknown flow type: {}. Possible values are implicit, password, application or accessCode",
                    p[3]
                )));
            }
            scheme.authorizationUrl = Some(p[2].clone());
            scheme.flow = Some(p[3].clone());
            if p.len() % 2 != 0 {
                scheme.description = Some(trim_quotes(&p[p.len() - 1]));
            }
            let mut i = 4;
            while i + 1 < p.len() {
                scheme.scopes.insert(p[i].clone(), trim_quotes(&p[i + 1]));
                i += 2;
            }
        }
        "apiKey" => {
            if p.len() < 4 {
                return Err(Warning::parse(format!(
                    "Not enough params for apiKey: {}",
                    p.len()
                )));
            }
            if p[3] != "header" && p[3] != "query" {
                return Err(Warning::parse(format!(
                    "Unknown in type: {}. Possible values are query or header",
                    p[3]
                )));
            }
            scheme.name = Some(p[2].clone());
            scheme.in_type = Some(p[3].clone());
            if p.len() > 4 {
                scheme.description = Some(trim_quotes(&p[4]));
            }
        }
        "basic" => {
            if p.len() > 2 {
                scheme.description = Some(trim_quotes(&p[2]));
            }
        }
        other => {
            return Err(Warning::parse(format!(
                "Unknown security type: {}. Possible values are oauth2, apiKey or basic",
                other
            )));
        }
    }

    Ok((p[0].clone(), scheme))
}
