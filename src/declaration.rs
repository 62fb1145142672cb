//! Language-neutral view of the Go declarations the generator consumes.
//!
//! The front-end in [`crate::golang`] produces these records; everything after
//! scanning only talks to a [`DeclarationIndex`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::SourceLocation;

/// A Go type expression as written in source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// `name` or `qualifier.name`
    Named {
        qualifier: Option<String>,
        name: String,
    },
    Pointer(Box<TypeExpr>),
    /// Slices and fixed-size arrays
    Slice(Box<TypeExpr>),
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    /// Inline `struct { ... }`
    Struct(Vec<FieldDescriptor>),
    Interface,
    Func,
    /// Anything else (channels, unparsable input)
    Other(String),
}

impl TypeExpr {
    pub fn named(qualifier: Option<&str>, name: &str) -> Self {
        TypeExpr::Named {
            qualifier: qualifier.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Strips any number of pointer indirections
    pub fn deref(&self) -> &TypeExpr {
        match self {
            TypeExpr::Pointer(inner) => inner.deref(),
            other => other,
        }
    }

    /// Name of the innermost named type, ignoring pointers
    pub fn base_name(&self) -> Option<&str> {
        match self.deref() {
            TypeExpr::Named { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named {
                qualifier: Some(q),
                name,
            } => write!(f, "{}.{}", q, name),
            TypeExpr::Named {
                qualifier: None,
                name,
            } => f.write_str(name),
            TypeExpr::Pointer(inner) => write!(f, "*{}", inner),
            TypeExpr::Slice(inner) => write!(f, "[]{}", inner),
            TypeExpr::Map { key, value } => write!(f, "map[{}]{}", key, value),
            TypeExpr::Struct(_) => f.write_str("struct{}"),
            TypeExpr::Interface => f.write_str("interface{}"),
            TypeExpr::Func => f.write_str("func()"),
            TypeExpr::Other(text) => f.write_str(text),
        }
    }
}

/// A struct field or function parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name; for embedded fields the embedded type's name
    pub name: String,
    pub type_ref: TypeExpr,
    /// Parsed struct tag, e.g. `json` -> `id,omitempty`
    pub tags: BTreeMap<String, String>,
    pub embedded: bool,
}

impl FieldDescriptor {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Expression forms the router walker understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Unquoted string literal
    Str(String),
    /// Identifier or selector chain, e.g. `beego.NSInclude`
    Path(Vec<String>),
    Call {
        callee: Vec<String>,
        args: Vec<Expr>,
    },
    /// Composite literal of a named type, e.g. `controllers.ObjectController{}`
    Composite {
        qualifier: Option<String>,
        name: String,
    },
    AddressOf(Box<Expr>),
    Other,
}

impl Expr {
    /// Last segment of a call's callee, e.g. `NSNamespace`
    pub fn call_name(&self) -> Option<&str> {
        match self {
            Expr::Call { callee, .. } => callee.last().map(String::as_str),
            _ => None,
        }
    }

    pub fn call_args(&self) -> &[Expr] {
        match self {
            Expr::Call { args, .. } => args,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Assign { targets: Vec<String>, value: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Func {
        /// Top-level statements of the body
        body: Vec<Statement>,
    },
    Type {
        underlying: TypeExpr,
        alias: bool,
    },
    Const {
        type_name: Option<String>,
        /// Literal as written, quotes included
        value: String,
    },
}

/// One top-level declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Import path of the owning package
    pub package_id: String,
    pub kind: DeclKind,
    pub name: String,
    /// Receiver type name for methods
    pub receiver: Option<String>,
    pub doc: String,
    /// Struct fields for struct types, parameters for functions
    pub fields: Vec<FieldDescriptor>,
    pub location: SourceLocation,
}

impl Declaration {
    pub fn is_method(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn is_struct(&self) -> bool {
        matches!(
            self.kind,
            DeclKind::Type {
                underlying: TypeExpr::Struct(_),
                ..
            }
        )
    }

    pub fn body(&self) -> &[Statement] {
        match &self.kind {
            DeclKind::Func { body } => body,
            _ => &[],
        }
    }
}

/// A parsed Go source file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub package_name: String,
    pub import_path: String,
    /// Local name to import path
    pub imports: BTreeMap<String, String>,
    /// Every comment group in the file, markers stripped
    pub comments: Vec<String>,
    pub declarations: Vec<Declaration>,
}

/// Read access to scanned declarations
pub trait DeclarationIndex {
    /// Known package import paths in sorted order
    fn package_ids(&self) -> Vec<&str>;

    fn package_name(&self, package_id: &str) -> Option<&str>;

    /// Declarations of a package, ordered by file path then source order
    fn list_declarations(&self, package_id: &str) -> Vec<&Declaration>;

    /// Imports of the file that holds a declaration
    fn file_imports(&self, file: &Path) -> Option<&BTreeMap<String, String>>;

    /// Finds a named type by package name and type name
    fn find_type(&self, package_name: &str, type_name: &str) -> Option<&Declaration> {
        self.package_ids()
            .into_iter()
            .filter(|id| self.package_name(id) == Some(package_name))
            .flat_map(|id| self.list_declarations(id))
            .find(|decl| matches!(decl.kind, DeclKind::Type { .. }) && decl.name == type_name)
    }

    /// Maps a qualifier used inside `from` to the package name it refers to
    fn resolve_qualifier(&self, from: &Declaration, qualifier: &str) -> Option<String> {
        let import = self.file_imports(&from.location.file)?.get(qualifier)?;
        let name = self
            .package_name(import)
            .map(str::to_string)
            .unwrap_or_else(|| last_segment(import).to_string());
        Some(name)
    }

    /// Constants declared with the given type, in declaration order
    fn consts_of_type(&self, package_id: &str, type_name: &str) -> Vec<&Declaration> {
        self.list_declarations(package_id)
            .into_iter()
            .filter(|decl| match &decl.kind {
                DeclKind::Const {
                    type_name: Some(t), ..
                } => t == type_name,
                _ => false,
            })
            .collect()
    }
}

/// Last path segment of an import path, the default package name
pub fn last_segment(import_path: &str) -> &str {
    import_path.rsplit('/').next().unwrap_or(import_path)
}

#[derive(Debug, Default)]
struct PackageEntry {
    name: String,
    declarations: Vec<Declaration>,
}

/// In-memory index over scanned source files
#[derive(Debug, Default)]
pub struct PackageIndex {
    packages: BTreeMap<String, PackageEntry>,
    imports: BTreeMap<PathBuf, BTreeMap<String, String>>,
}

impl PackageIndex {
    /// Builds the index; files are expected in scan order
    pub fn new(files: Vec<SourceFile>) -> Self {
        let mut index = PackageIndex::default();
        for file in files {
            index.imports.insert(file.path.clone(), file.imports);
            let entry = index
                .packages
                .entry(file.import_path)
                .or_insert_with(|| PackageEntry {
                    name: file.package_name.clone(),
                    declarations: Vec::new(),
                });
            entry.declarations.extend(file.declarations);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl DeclarationIndex for PackageIndex {
    fn package_ids(&self) -> Vec<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    fn package_name(&self, package_id: &str) -> Option<&str> {
        self.packages.get(package_id).map(|p| p.name.as_str())
    }

    fn list_declarations(&self, package_id: &str) -> Vec<&Declaration> {
        self.packages
            .get(package_id)
            .map(|p| p.declarations.iter().collect())
            .unwrap_or_default()
    }

    fn file_imports(&self, file: &Path) -> Option<&BTreeMap<String, String>> {
        self.imports.get(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_decl(package_id: &str, name: &str, file: &str) -> Declaration {
        Declaration {
            package_id: package_id.to_string(),
            kind: DeclKind::Type {
                underlying: TypeExpr::Struct(Vec::new()),
                alias: false,
            },
            name: name.to_string(),
            receiver: None,
            doc: String::new(),
            fields: Vec::new(),
            location: SourceLocation {
                file: PathBuf::from(file),
                line: 1,
                symbol: name.to_string(),
            },
        }
    }

    fn file(path: &str, package: &str, import_path: &str, decls: Vec<Declaration>) -> SourceFile {
        let mut imports = BTreeMap::new();
        imports.insert("m".to_string(), "example.com/app/models".to_string());
        SourceFile {
            path: PathBuf::from(path),
            package_name: package.to_string(),
            import_path: import_path.to_string(),
            imports,
            comments: Vec::new(),
            declarations: decls,
        }
    }

    #[test]
    fn test_find_type_by_package_name() {
        let index = PackageIndex::new(vec![file(
            "models/user.go",
            "models",
            "example.com/app/models",
            vec![type_decl("example.com/app/models", "User", "models/user.go")],
        )]);

        assert!(index.find_type("models", "User").is_some());
        assert!(index.find_type("models", "Missing").is_none());
        assert!(index.find_type("controllers", "User").is_none());
    }

    #[test]
    fn test_resolve_aliased_qualifier() {
        let decl = type_decl("example.com/app/controllers", "Ctl", "controllers/a.go");
        let index = PackageIndex::new(vec![
            file(
                "controllers/a.go",
                "controllers",
                "example.com/app/controllers",
                vec![decl.clone()],
            ),
            file("models/user.go", "models", "example.com/app/models", Vec::new()),
        ]);

        assert_eq!(index.resolve_qualifier(&decl, "m").as_deref(), Some("models"));
        assert_eq!(index.resolve_qualifier(&decl, "nope"), None);
    }

    #[test]
    fn test_type_expr_display() {
        let expr = TypeExpr::Slice(Box::new(TypeExpr::Pointer(Box::new(TypeExpr::named(
            Some("models"),
            "User",
        )))));
        assert_eq!(expr.to_string(), "[]*models.User");
        assert_eq!(expr.base_name(), None);
        assert_eq!(
            TypeExpr::Pointer(Box::new(TypeExpr::named(None, "Item"))).base_name(),
            Some("Item")
        );
    }
}
