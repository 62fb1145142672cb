//! Reconstructs the URL layout from the namespace calls in the router file.
//!
//! The router's statements are first folded into a tree of [`RouteNode`]s,
//! which is then walked with an explicit stack of namespace frames.

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::declaration::{DeclarationIndex, Expr, SourceFile, Statement};
use crate::error::{SourceLocation, Warning};
use crate::models::{Operation, Tag};

/// Identifies a controller type by package import path and type name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControllerKey {
    pub import_path: String,
    pub type_name: String,
}

impl ControllerKey {
    pub fn new(import_path: &str, type_name: &str) -> Self {
        Self {
            import_path: import_path.to_string(),
            type_name: type_name.to_string(),
        }
    }
}

impl fmt::Display for ControllerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.import_path.is_empty() {
            f.write_str(&self.type_name)
        } else {
            write!(f, "{}.{}", self.import_path, self.type_name)
        }
    }
}

/// An operation parsed from a controller method, before routing
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOperation {
    /// Route as written in `@router`, relative to the controller's namespace
    pub route: String,
    pub methods: Vec<String>,
    pub operation: Operation,
    pub source: SourceLocation,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ControllerEntry {
    description: Option<String>,
    operations: Vec<ControllerOperation>,
}

/// Operations grouped by the controller that declares them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerRegistry {
    controllers: BTreeMap<ControllerKey, ControllerEntry>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operation(&mut self, controller: ControllerKey, operation: ControllerOperation) {
        self.controllers
            .entry(controller)
            .or_default()
            .operations
            .push(operation);
    }

    /// Doc comment of the controller type, used as its tag description
    pub fn describe(&mut self, controller: ControllerKey, description: &str) {
        let description = description.trim();
        if !description.is_empty() {
            self.controllers.entry(controller).or_default().description =
                Some(description.to_string());
        }
    }

    pub fn operations(&self, controller: &ControllerKey) -> &[ControllerOperation] {
        self.controllers
            .get(controller)
            .map(|entry| entry.operations.as_slice())
            .unwrap_or_default()
    }

    fn description(&self, controller: &ControllerKey) -> Option<&str> {
        self.controllers
            .get(controller)
            .and_then(|entry| entry.description.as_deref())
    }

    pub fn operation_count(&self) -> usize {
        self.controllers.values().map(|e| e.operations.len()).sum()
    }

    fn controllers_with_operations(&self) -> impl Iterator<Item = &ControllerKey> {
        self.controllers
            .iter()
            .filter(|(_, entry)| !entry.operations.is_empty())
            .map(|(key, _)| key)
    }
}

/// Transient tree built from the router's call expressions
#[derive(Debug, Clone, PartialEq)]
pub enum RouteNode {
    /// `NewNamespace` or `NSNamespace`
    Namespace {
        prefix: String,
        top_level: bool,
        children: Vec<RouteNode>,
    },
    /// `NSInclude` or a bare `Include`
    Include { controller: ControllerKey },
}

/// An operation with its final path and method
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedOperation {
    pub path: String,
    pub method: String,
    pub operation: Operation,
    pub source: SourceLocation,
    pub controller: ControllerKey,
}

/// Result of walking the router file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    pub base_path: Option<String>,
    pub routes: Vec<RoutedOperation>,
    pub tags: Vec<Tag>,
    pub warnings: Vec<Warning>,
}

/// Where the walker currently is
#[derive(Debug, Clone, PartialEq)]
enum WalkState {
    Idle,
    InNamespace { prefix: String, tag: Option<String> },
    InInclude { controller: ControllerKey },
}

/// Converts a beego route into a swagger path template.
///
/// `:id`, `?:id`, `{id:int}` and `:id([0-9]+)` all become `{id}`.
pub fn url_replace(route: &str) -> String {
    route
        .split('/')
        .map(|segment| {
            let mut segment = if let Some(name) = segment.strip_prefix("?:") {
                format!("{{{}}}", name)
            } else if let Some(name) = segment.strip_prefix(':') {
                format!("{{{}}}", name)
            } else {
                segment.to_string()
            };

            if segment.starts_with('{') {
                if let Some(pos) = segment.find(|c| c == ':' || c == '(') {
                    segment.truncate(pos);
                    segment.push('}');
                }
            }
            segment
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn join_prefix(base: &str, prefix: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), prefix)
}

/// Walks the router file and lays controller operations out under their namespaces
pub struct RouteTopologyWalker<'a, I: DeclarationIndex + ?Sized> {
    index: &'a I,
    registry: &'a ControllerRegistry,
    router: &'a SourceFile,
    state: WalkState,
    stack: Vec<WalkState>,
    included: BTreeSet<ControllerKey>,
    warnings: Vec<Warning>,
}

impl<'a, I: DeclarationIndex + ?Sized> RouteTopologyWalker<'a, I> {
    pub fn new(index: &'a I, registry: &'a ControllerRegistry, router: &'a SourceFile) -> Self {
        Self {
            index,
            registry,
            router,
            state: WalkState::Idle,
            stack: Vec::new(),
            included: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Builds the route tree from every plain function in the router file
    pub fn build_tree(&mut self) -> Vec<RouteNode> {
        let mut roots = Vec::new();
        let router = self.router;

        for decl in router.declarations.iter().filter(|d| !d.is_method()) {
            let mut locals: HashMap<&str, &Expr> = HashMap::new();
            for statement in decl.body() {
                match statement {
                    Statement::Assign { targets, value } => {
                        if value.call_name().is_some() {
                            self.collect_calls(value, &locals, &decl.location, &mut roots);
                        }
                        if let Some(target) = targets.first() {
                            locals.insert(target.as_str(), value);
                        }
                    }
                    Statement::Expr(expr) => {
                        self.collect_calls(expr, &locals, &decl.location, &mut roots)
                    }
                }
            }
        }

        roots
    }

    // Finds top-level registrations anywhere inside an expression
    fn collect_calls(
        &mut self,
        expr: &Expr,
        locals: &HashMap<&str, &Expr>,
        location: &SourceLocation,
        roots: &mut Vec<RouteNode>,
    ) {
        match expr.call_name() {
            Some("NewNamespace") => {
                if let Some(node) = self.namespace_node(expr, true, locals, location) {
                    roots.push(node);
                }
            }
            Some("Include") => {
                for arg in expr.call_args() {
                    if let Some(controller) = self.controller_of(arg, locals, location) {
                        roots.push(RouteNode::Include { controller });
                    }
                }
            }
            Some(_) => {
                for arg in expr.call_args() {
                    self.collect_calls(arg, locals, location, roots);
                }
            }
            None => {}
        }
    }

    fn namespace_node(
        &mut self,
        call: &Expr,
        top_level: bool,
        locals: &HashMap<&str, &Expr>,
        location: &SourceLocation,
    ) -> Option<RouteNode> {
        let (first, rest) = call.call_args().split_first()?;
        let prefix = match first {
            Expr::Str(prefix) => prefix.clone(),
            _ => {
                self.warn(
                    Warning::topology("Namespace prefix is not a string literal, skipping it")
                        .at(location.clone()),
                );
                return None;
            }
        };

        let mut children = Vec::new();
        for arg in rest {
            match arg.call_name() {
                Some("NSNamespace") => {
                    if let Some(child) = self.namespace_node(arg, false, locals, location) {
                        children.push(child);
                    }
                }
                Some("NSInclude") => {
                    for include in arg.call_args() {
                        if let Some(controller) = self.controller_of(include, locals, location) {
                            children.push(RouteNode::Include { controller });
                        }
                    }
                }
                Some(other) => debug!("Ignoring namespace option {}", other),
                None => {}
            }
        }

        Some(RouteNode::Namespace {
            prefix,
            top_level,
            children,
        })
    }

    /// Controller type referenced by an include argument
    fn controller_of(
        &mut self,
        expr: &Expr,
        locals: &HashMap<&str, &Expr>,
        location: &SourceLocation,
    ) -> Option<ControllerKey> {
        match expr {
            Expr::AddressOf(inner) => self.controller_of(inner, locals, location),
            Expr::Composite { qualifier, name } => {
                let import_path = match qualifier {
                    Some(q) => self.import_path_of(q),
                    None => Some(self.router.import_path.clone()),
                };
                match import_path {
                    Some(import_path) => Some(ControllerKey::new(&import_path, name)),
                    None => {
                        self.warn(
                            Warning::topology(format!(
                                "Unknown package {} for controller {}",
                                qualifier.as_deref().unwrap_or_default(),
                                name
                            ))
                            .at(location.clone()),
                        );
                        None
                    }
                }
            }
            Expr::Path(segments) if segments.len() == 1 => {
                match locals.get(segments[0].as_str()) {
                    Some(value) => self.controller_of(value, locals, location),
                    None => {
                        self.warn(
                            Warning::topology(format!(
                                "Couldn't determine controller type of {}",
                                segments[0]
                            ))
                            .at(location.clone()),
                        );
                        None
                    }
                }
            }
            _ => {
                self.warn(
                    Warning::topology("Couldn't determine controller type of include")
                        .at(location.clone()),
                );
                None
            }
        }
    }

    fn import_path_of(&self, qualifier: &str) -> Option<String> {
        if let Some(path) = self.router.imports.get(qualifier) {
            return Some(path.clone());
        }
        // fall back to a project package with that name
        self.index
            .package_ids()
            .into_iter()
            .find(|id| self.index.package_name(id) == Some(qualifier))
            .map(str::to_string)
    }

    fn warn(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    fn enter(&mut self, next: WalkState) {
        debug!("{:?} -> {:?}", self.state, next);
        let previous = std::mem::replace(&mut self.state, next);
        self.stack.push(previous);
    }

    fn leave(&mut self) {
        self.state = self.stack.pop().unwrap_or(WalkState::Idle);
    }

    fn current_prefix(&self) -> String {
        self.stack
            .iter()
            .chain(std::iter::once(&self.state))
            .filter_map(|state| match state {
                WalkState::InNamespace { prefix, .. } => Some(prefix.as_str()),
                _ => None,
            })
            .fold(String::new(), |acc, prefix| join_prefix(&acc, prefix))
    }

    fn current_tag(&self) -> Option<String> {
        self.stack
            .iter()
            .chain(std::iter::once(&self.state))
            .rev()
            .find_map(|state| match state {
                WalkState::InNamespace { tag: Some(tag), .. } => Some(tag.clone()),
                _ => None,
            })
    }

    /// Walks the router and returns every routed operation
    pub fn walk(mut self) -> Topology {
        let roots = self.build_tree();
        let mut topology = Topology::default();

        for root in &roots {
            self.walk_node(root, &mut topology);
        }

        for controller in self.registry.controllers_with_operations() {
            if !self.included.contains(controller) {
                let warning = Warning::topology(format!(
                    "Controller {} has routes but is never included by the router, dropping {} operations",
                    controller,
                    self.registry.operations(controller).len()
                ));
                warn!("{}", warning);
                self.warnings.push(warning);
            }
        }

        info!(
            "Router walk produced {} operations from {} namespaces and includes",
            topology.routes.len(),
            roots.len()
        );
        topology.warnings = self.warnings;
        topology
    }

    fn walk_node(&mut self, node: &RouteNode, topology: &mut Topology) {
        match node {
            RouteNode::Namespace {
                prefix,
                top_level: true,
                children,
            } if self.state == WalkState::Idle => {
                // the first top-level namespace becomes basePath
                let prefix = match &topology.base_path {
                    None => {
                        topology.base_path = Some(prefix.clone());
                        String::new()
                    }
                    Some(base) if base == prefix => String::new(),
                    Some(base) => {
                        self.warn(Warning::topology(format!(
                            "Namespace {} differs from basePath {}, its routes are documented under basePath",
                            prefix, base
                        )));
                        String::new()
                    }
                };
                self.enter(WalkState::InNamespace { prefix, tag: None });
                for child in children {
                    self.walk_node(child, topology);
                }
                self.leave();
            }
            RouteNode::Namespace {
                prefix, children, ..
            } => {
                let tag = prefix.trim_matches('/').to_string();
                self.enter(WalkState::InNamespace {
                    prefix: prefix.clone(),
                    tag: Some(tag).filter(|t| !t.is_empty()),
                });
                for child in children {
                    self.walk_node(child, topology);
                }
                self.leave();
            }
            RouteNode::Include { controller } => {
                let prefix = self.current_prefix();
                let tag = self
                    .current_tag()
                    .unwrap_or_else(|| controller.type_name.clone());
                self.enter(WalkState::InInclude {
                    controller: controller.clone(),
                });
                self.include(controller, &prefix, &tag, topology);
                self.leave();
            }
        }
    }

    fn include(
        &mut self,
        controller: &ControllerKey,
        prefix: &str,
        tag: &str,
        topology: &mut Topology,
    ) {
        self.included.insert(controller.clone());
        let operations = self.registry.operations(controller);
        if operations.is_empty() {
            debug!("Controller {} has no annotated routes", controller);
        }

        if let Some(description) = self.registry.description(controller) {
            if !topology.tags.iter().any(|t| t.name == tag) {
                topology.tags.push(Tag {
                    name: tag.to_string(),
                    description: Some(description.to_string()),
                });
            }
        }

        for op in operations {
            let path = url_replace(&join_prefix(prefix, &op.route));
            for method in &op.methods {
                let mut operation = op.operation.clone();
                operation.tags = vec![tag.to_string()];
                topology.routes.push(RoutedOperation {
                    path: path.clone(),
                    method: method.clone(),
                    operation,
                    source: op.source.clone(),
                    controller: controller.clone(),
                });
            }
        }
    }
}
