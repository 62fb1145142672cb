use beeswag::{
    build_document, generate_docs, CancellationToken, GenerateOptions, OutputFormat, WarningKind,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use tempfile::TempDir;

/// Helper function to create a temporary test project
fn create_test_project(files: Vec<(&str, &str)>) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    for (path, content) in files {
        let file_path = temp_dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&file_path, content).expect("Failed to write test file");
    }

    temp_dir
}

fn beego_app() -> TempDir {
    create_test_project(vec![
        ("go.mod", "module example.com/app\n\ngo 1.20\n"),
        ("main.go", "package main\n\nfunc main() {\n}\n"),
        ("routers/router.go", include_str!("fixtures/beego_app/router.go")),
        (
            "controllers/object.go",
            include_str!("fixtures/beego_app/object_controller.go"),
        ),
        (
            "controllers/user.go",
            include_str!("fixtures/beego_app/user_controller.go"),
        ),
        ("models/models.go", include_str!("fixtures/beego_app/models.go")),
        // neither of these may be scanned
        ("vendor/github.com/astaxie/beego/broken.go", "this is not go"),
        (".cache/broken.go", "this is not go either"),
    ])
}

fn read_json(path: &std::path::Path) -> Value {
    let content = std::fs::read_to_string(path).expect("Failed to read output");
    serde_json::from_str(&content).expect("Output should be valid JSON")
}

#[test]
fn test_beego_end_to_end_generation() {
    let temp_dir = beego_app();
    let options = GenerateOptions::new(temp_dir.path());

    let report = generate_docs(&options, &CancellationToken::new()).expect("Generation failed");

    let out = temp_dir.path().join("swagger");
    assert_eq!(
        report.written,
        vec![out.join("swagger.json"), out.join("swagger.yml")]
    );

    // Only the orphaned admin controller is worth a warning
    assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
    assert_eq!(report.warnings[0].kind, WarningKind::Topology);
    assert!(report.warnings[0].message.contains("AdminController"));

    let json = read_json(&out.join("swagger.json"));
    assert_eq!(json["swagger"], "2.0");
    assert_eq!(json["basePath"], "/v1");
    assert_eq!(json["host"], "api.example.com:8443");
    assert_eq!(json["schemes"], serde_json::json!(["https"]));
    assert_eq!(json["info"]["title"], "beego Test API");
    assert_eq!(json["info"]["version"], "1.0.0");
    assert_eq!(json["info"]["contact"]["email"], "astaxie@gmail.com");
    assert_eq!(json["info"]["license"]["name"], "Apache 2.0");

    let paths: Vec<&str> = json["paths"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(paths, vec!["/object/", "/object/{objectId}", "/user/"]);

    let create = &json["paths"]["/object/"]["post"];
    assert_eq!(create["operationId"], "ObjectController.Create");
    assert_eq!(create["tags"], serde_json::json!(["object"]));
    assert_eq!(create["parameters"][0]["in"], "body");
    assert_eq!(
        create["parameters"][0]["schema"]["$ref"],
        "#/definitions/models.Object"
    );
    assert_eq!(create["responses"]["403"]["description"], "body is empty");

    let list = &json["paths"]["/object/"]["get"];
    assert_eq!(list["responses"]["200"]["schema"]["type"], "array");
    assert_eq!(
        list["responses"]["200"]["schema"]["items"]["$ref"],
        "#/definitions/models.Object"
    );

    let get = &json["paths"]["/object/{objectId}"]["get"];
    assert_eq!(get["parameters"][0]["in"], "path");
    assert_eq!(get["parameters"][0]["required"], true);

    let delete = &json["paths"]["/object/{objectId}"]["delete"];
    assert_eq!(delete["deprecated"], true);
    assert_eq!(delete["responses"]["200"]["description"], "delete success!");

    let user = &json["paths"]["/user/"]["post"];
    assert_eq!(user["tags"], serde_json::json!(["user"]));
    assert_eq!(user["consumes"], serde_json::json!(["application/json"]));

    let tags = json["tags"].as_array().unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0]["name"], "object");
    assert_eq!(tags[0]["description"], "Operations about object");
    assert_eq!(tags[1]["name"], "user");
    assert_eq!(tags[1]["description"], "Operations about Users");
}

#[test]
fn test_definitions_follow_references() {
    let temp_dir = beego_app();
    let (doc, _) = build_document(
        &GenerateOptions::new(temp_dir.path()),
        &CancellationToken::new(),
    )
    .expect("Generation failed");

    let names: Vec<&str> = doc.definitions.keys().map(String::as_str).collect();
    // models.Unused is only used by the orphaned controller
    assert_eq!(names, vec!["models.Object", "models.Profile", "models.User"]);

    let object = &doc.definitions["models.Object"];
    assert_eq!(object.title.as_deref(), Some("Object"));
    assert_eq!(object.required, vec!["objectId"]);
    assert_eq!(
        object.properties["owner"].ref_.as_deref(),
        Some("#/definitions/models.User")
    );
    assert_eq!(
        object.properties["score"].description.as_deref(),
        Some("player score")
    );
    assert_eq!(object.properties["created"].format.as_deref(), Some("datetime"));
    assert!(object.properties.contains_key("playerName"));

    let user = &doc.definitions["models.User"];
    assert_eq!(user.properties["username"].maxLength, Some(32));
    let friends = &user.properties["friends"];
    assert_eq!(friends.type_.as_deref(), Some("array"));
    assert_eq!(
        friends.items.as_ref().and_then(|i| i.ref_.as_deref()),
        Some("#/definitions/models.User")
    );

    let profile = &doc.definitions["models.Profile"];
    assert!(profile.properties.contains_key("Age"));
}

#[test]
fn test_unbound_function_params_are_documented() {
    let temp_dir = beego_app();
    let (doc, _) = build_document(
        &GenerateOptions::new(temp_dir.path()),
        &CancellationToken::new(),
    )
    .expect("Generation failed");

    let put = doc.paths["/object/{objectId}"].put.as_ref().unwrap();
    let params: Vec<(&str, &str, Option<&str>)> = put
        .parameters
        .iter()
        .map(|p| (p.name.as_str(), p.in_type.as_str(), p.type_.as_deref()))
        .collect();
    assert_eq!(
        params,
        vec![
            ("objectId", "path", Some("string")),
            ("score", "query", Some("integer")),
            ("verbose", "query", Some("boolean")),
        ]
    );
}

#[test]
fn test_generation_is_idempotent() {
    let temp_dir = beego_app();
    let mut options = GenerateOptions::new(temp_dir.path());
    options.workers = Some(1);

    generate_docs(&options, &CancellationToken::new()).expect("First run failed");
    let json_path = options.output_path().join("swagger.json");
    let yaml_path = options.output_path().join("swagger.yml");
    let first_json = std::fs::read(&json_path).unwrap();
    let first_yaml = std::fs::read(&yaml_path).unwrap();

    options.workers = Some(4);
    generate_docs(&options, &CancellationToken::new()).expect("Second run failed");
    assert_eq!(first_json, std::fs::read(&json_path).unwrap());
    assert_eq!(first_yaml, std::fs::read(&yaml_path).unwrap());
}

#[test]
fn test_yaml_matches_json() {
    let temp_dir = beego_app();
    let report = generate_docs(
        &GenerateOptions::new(temp_dir.path()),
        &CancellationToken::new(),
    )
    .expect("Generation failed");

    let json = read_json(&report.written[0]);
    let yaml: Value = serde_yaml::from_str(&std::fs::read_to_string(&report.written[1]).unwrap())
        .expect("Output should be valid YAML");
    assert_eq!(json, yaml);
}

#[test]
fn test_excluded_dir_and_single_format() {
    let temp_dir = beego_app();
    let mut options = GenerateOptions::new(temp_dir.path());
    options.excluded_dirs = vec!["models".to_string()];
    options.formats = vec![OutputFormat::Json];
    options.output_dir = "docs".into();

    let report = generate_docs(&options, &CancellationToken::new()).expect("Generation failed");

    assert_eq!(report.written, vec![temp_dir.path().join("docs/swagger.json")]);
    assert!(!temp_dir.path().join("docs/swagger.yml").exists());

    // without the models package every referenced type is a stub
    let resolution = report
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::Resolution)
        .count();
    assert!(resolution > 0);
    let object = &report.document.definitions["models.Object"];
    assert_eq!(object.type_.as_deref(), Some("object"));
    assert!(object.properties.is_empty());
}
