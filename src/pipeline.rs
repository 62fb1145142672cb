use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::declaration::{DeclKind, DeclarationIndex, PackageIndex};
use crate::error::{DocsError, Result, Warning};
use crate::generator::{write_documents, OutputFormat, SpecAssembler};
use crate::golang;
use crate::models::Document;
use crate::parser::AnnotationParser;
use crate::resolver::SchemaResolver;
use crate::router::{ControllerKey, ControllerOperation, ControllerRegistry, RouteTopologyWalker};
use crate::scanner::{import_path_for, relative_path, ProjectScanner};

/// Cooperative cancellation flag shared between the caller and a run
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DocsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Settings for one documentation run
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub project_root: PathBuf,
    /// Output directory, relative to the project root unless absolute
    pub output_dir: PathBuf,
    /// Router file, relative to the project root unless absolute
    pub router_file: PathBuf,
    pub workers: Option<usize>,
    pub excluded_dirs: Vec<String>,
    pub formats: Vec<OutputFormat>,
}

impl GenerateOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            output_dir: PathBuf::from("swagger"),
            router_file: PathBuf::from("routers").join("router.go"),
            workers: None,
            excluded_dirs: Vec::new(),
            formats: vec![OutputFormat::Json, OutputFormat::Yaml],
        }
    }

    fn under_root(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.under_root(&self.output_dir)
    }

    pub fn router_path(&self) -> PathBuf {
        self.under_root(&self.router_file)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub document: Document,
    pub warnings: Vec<Warning>,
    pub written: Vec<PathBuf>,
}

/// Builds the swagger document for a project without writing anything
pub fn build_document(
    options: &GenerateOptions,
    cancel: &CancellationToken,
) -> Result<(Document, Vec<Warning>)> {
    let root = &options.project_root;
    if !root.is_dir() {
        return Err(DocsError::InvalidProjectRoot(root.clone()));
    }

    let router_path = options.router_path();
    let router_source =
        fs::read_to_string(&router_path).map_err(|source| DocsError::RouterUnreadable {
            path: router_path.clone(),
            source,
        })?;

    let mut scanner = ProjectScanner::new(root)
        .with_excluded_dirs(&options.excluded_dirs)
        .with_cancellation(cancel.clone());
    if let Some(workers) = options.workers {
        scanner = scanner.with_workers(workers);
    }
    let scan = scanner.scan().ok_or(DocsError::Cancelled)?;
    cancel.check()?;

    let router_relative = relative_path(root, &router_path);
    let router_import = import_path_for(scan.module_path.as_deref(), &router_relative);
    let router = golang::parse_source(&router_relative, &router_source, &router_import)
        .map_err(|_| DocsError::RouterMissing(router_path.clone()))?;

    let mut warnings = scan.warnings;
    let index = PackageIndex::new(scan.files);
    info!("Indexed {} packages", index.len());

    let parser = AnnotationParser::new();
    let mut resolver = SchemaResolver::new(&index);
    let mut registry = ControllerRegistry::new();

    for package_id in index.package_ids() {
        for decl in index.list_declarations(package_id) {
            cancel.check()?;

            if decl.is_struct() {
                registry.describe(ControllerKey::new(package_id, &decl.name), &decl.doc);
                continue;
            }
            let (DeclKind::Func { .. }, Some(receiver)) = (&decl.kind, &decl.receiver) else {
                continue;
            };
            if decl.doc.is_empty() {
                continue;
            }

            let (mut parsed, parse_warnings) = parser.parse(&decl.doc, receiver);
            let Some(route) = parsed.route.clone() else {
                debug!("{} has no @router, skipping", decl.location.symbol);
                continue;
            };
            let signature_warnings = parsed.apply_signature(&decl.fields);
            warnings.extend(
                parse_warnings
                    .into_iter()
                    .chain(signature_warnings)
                    .map(|w| w.at(decl.location.clone())),
            );

            for schema in parsed.operation.schemas_mut() {
                resolver.link(schema, decl);
            }

            registry.add_operation(
                ControllerKey::new(package_id, receiver),
                ControllerOperation {
                    route: route.path,
                    methods: route.methods,
                    operation: parsed.operation,
                    source: decl.location.clone(),
                },
            );
        }
    }
    info!("Found {} annotated operations", registry.operation_count());
    cancel.check()?;

    let topology = RouteTopologyWalker::new(&index, &registry, &router).walk();
    if topology.base_path.is_none() && topology.routes.is_empty() && registry.operation_count() > 0
    {
        return Err(DocsError::RouterMissing(router_path));
    }

    let (mut meta, meta_warnings) = parser.parse_document_meta(&router.comments);
    meta.base_path = topology.base_path;
    meta.tags = topology.tags;

    let (definitions, resolve_warnings) = resolver.into_parts();
    warnings.extend(meta_warnings);
    warnings.extend(resolve_warnings);
    warnings.extend(topology.warnings);

    let (document, assembly_warnings) = SpecAssembler::new(meta).assemble(topology.routes, definitions);
    warnings.extend(assembly_warnings);
    cancel.check()?;

    Ok((document, warnings))
}

/// Runs the whole pipeline and writes the requested output files
pub fn generate_docs(options: &GenerateOptions, cancel: &CancellationToken) -> Result<GenerationReport> {
    let (document, warnings) = build_document(options, cancel)?;
    cancel.check()?;

    let written = write_documents(&document, &options.output_path(), &options.formats)?;
    Ok(GenerationReport {
        document,
        warnings,
        written,
    })
}
