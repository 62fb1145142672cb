//! Generates Swagger 2.0 documentation for beego projects from the
//! annotations on controller methods and the namespaces in the router file.
//!
//! The pipeline runs in stages: [`scanner`] finds and parses the Go sources,
//! [`parser`] reads the annotations, [`resolver`] turns Go types into schema
//! definitions, [`router`] lays the operations out under their URLs and
//! [`generator`] assembles and writes the document.

pub mod cli;
pub mod declaration;
pub mod error;
pub mod generator;
pub mod golang;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod router;
pub mod scanner;

pub use error::{DocsError, Result, Warning, WarningKind};
pub use generator::OutputFormat;
pub use models::Document;
pub use pipeline::{build_document, generate_docs, CancellationToken, GenerateOptions, GenerationReport};

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    use crate::error::{DocsError, WarningKind};
    use crate::pipeline::{build_document, generate_docs, CancellationToken, GenerateOptions};

    fn write(root: &Path, path: &str, content: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const ROUTER: &str = r#"// @APIVersion 1.0.0
// @Title demo API
package routers

import (
    "example.com/demo/controllers"

    "github.com/astaxie/beego"
)

func init() {
    ns := beego.NewNamespace("/v1",
        beego.NSNamespace("/item",
            beego.NSInclude(
                &controllers.ItemController{},
            ),
        ),
    )
    beego.AddNamespace(ns)
}
"#;

    fn demo_project(root: &Path, controller: &str) {
        write(root, "go.mod", "module example.com/demo\n\ngo 1.20\n");
        write(root, "routers/router.go", ROUTER);
        write(root, "controllers/item.go", controller);
    }

    #[test]
    fn test_param_round_trip() {
        let dir = tempdir().unwrap();
        demo_project(
            dir.path(),
            r#"
package controllers

import "github.com/astaxie/beego"

type ItemController struct {
    beego.Controller
}

// @Title List
// @Param	limit	query	int	10	false	"page size"
// @Param	tags	query	[]string	false	"tag filter"
// @Success 200 {array} string
// @router /?:page [get]
func (c *ItemController) List() {
}
"#,
        );

        let (doc, warnings) =
            build_document(&GenerateOptions::new(dir.path()), &CancellationToken::new()).unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings);

        let get = doc.paths["/item/{page}"].get.as_ref().unwrap();
        assert_eq!(get.operationId.as_deref(), Some("ItemController.List"));

        let limit = &get.parameters[0];
        assert_eq!(limit.in_type, "query");
        assert_eq!(limit.type_.as_deref(), Some("integer"));
        assert_eq!(limit.format.as_deref(), Some("int64"));
        assert_eq!(limit.default, Some(serde_json::json!(10)));
        assert!(!limit.required);

        let tags = &get.parameters[1];
        assert_eq!(tags.type_.as_deref(), Some("array"));
        assert_eq!(
            tags.items.as_ref().and_then(|i| i.type_.as_deref()),
            Some("string")
        );

        let schema = get.responses["200"].schema.as_ref().unwrap();
        assert_eq!(schema.type_.as_deref(), Some("array"));
        assert_eq!(
            schema.items.as_ref().and_then(|i| i.type_.as_deref()),
            Some("string")
        );
    }

    #[test]
    fn test_duplicate_route_warns() {
        let dir = tempdir().unwrap();
        demo_project(
            dir.path(),
            r#"
package controllers

import "github.com/astaxie/beego"

type ItemController struct {
    beego.Controller
}

// @Summary first
// @router / [get]
func (c *ItemController) First() {
}

// @Summary second
// @router / [get]
func (c *ItemController) Second() {
}
"#,
        );

        let (doc, warnings) =
            build_document(&GenerateOptions::new(dir.path()), &CancellationToken::new()).unwrap();

        let get = doc.paths["/item/"].get.as_ref().unwrap();
        assert_eq!(get.summary.as_deref(), Some("second"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::Topology);
        assert!(warnings[0].message.contains("ItemController.First"));
    }

    #[test]
    fn test_duplicate_route_across_controllers() {
        let dir = tempdir().unwrap();
        write(dir.path(), "go.mod", "module example.com/demo\n");
        write(
            dir.path(),
            "routers/router.go",
            r#"package routers

import (
    "example.com/demo/controllers"

    "github.com/astaxie/beego"
)

func init() {
    ns := beego.NewNamespace("/v1",
        beego.NSNamespace("/w",
            beego.NSInclude(
                &controllers.AController{},
                &controllers.BController{},
            ),
        ),
    )
    beego.AddNamespace(ns)
}
"#,
        );
        write(
            dir.path(),
            "controllers/a.go",
            r#"package controllers

type AController struct {}

// @Summary a
// @router /widgets [get]
func (c *AController) List() {
}
"#,
        );
        write(
            dir.path(),
            "controllers/b.go",
            r#"package controllers

type BController struct {}

// @Summary b
// @router /widgets [get]
func (c *BController) List() {
}
"#,
        );

        let (doc, warnings) =
            build_document(&GenerateOptions::new(dir.path()), &CancellationToken::new()).unwrap();

        let get = doc.paths["/w/widgets"].get.as_ref().unwrap();
        assert_eq!(get.summary.as_deref(), Some("b"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::Topology);
        assert!(warnings[0].message.contains("controllers/a.go:7 (AController.List)"));
        assert_eq!(
            warnings[0].source.as_ref().map(|s| s.symbol.as_str()),
            Some("BController.List")
        );
    }

    #[test]
    fn test_cancelled_run_writes_nothing() {
        let dir = tempdir().unwrap();
        demo_project(
            dir.path(),
            r#"
package controllers

type ItemController struct {}

// @router / [get]
func (c *ItemController) Get() {
}
"#,
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = GenerateOptions::new(dir.path());
        let err = generate_docs(&options, &cancel).unwrap_err();

        assert!(matches!(err, DocsError::Cancelled));
        assert!(!options.output_path().exists());
    }

    #[test]
    fn test_router_without_namespaces() {
        let dir = tempdir().unwrap();
        write(dir.path(), "routers/router.go", "package routers\n\nfunc init() {\n}\n");
        write(
            dir.path(),
            "controllers/item.go",
            r#"
package controllers

type ItemController struct {}

// @router / [get]
func (c *ItemController) Get() {
}
"#,
        );

        let err = build_document(&GenerateOptions::new(dir.path()), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, DocsError::RouterMissing(_)));
    }

    #[test]
    fn test_unreadable_router() {
        let dir = tempdir().unwrap();
        let err = build_document(&GenerateOptions::new(dir.path()), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, DocsError::RouterUnreadable { .. }));
    }
}
