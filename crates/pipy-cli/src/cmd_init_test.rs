// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use rstest::rstest;

use super::*;

#[rstest]
#[case(vec![], vec![])]
#[case(vec!["3.9", "3.10"], vec!["requests>=2", "attrs"])]
fn test_template_is_a_valid_project(#[case] versions: Vec<&str>, #[case] packages: Vec<&str>) {
    let cmd = CmdInit {
        name: None,
        versions: versions.iter().map(ToString::to_string).collect(),
        packages: packages.iter().map(ToString::to_string).collect(),
    };

    let spec = pipy::ProjectSpec::from_toml(&cmd.template("demo"), Path::new("pyproject.toml"))
        .expect("template should parse");

    assert_eq!(spec.name, "demo");
    assert_eq!(spec.versions, versions);
    assert_eq!(spec.environment("base").unwrap().packages, packages);
    assert!(spec.alias("setup").is_some());
}

#[rstest]
#[case("de\u{7f}mo", "requests")]
#[case("demo", "pkg\u{1b}[0m")]
#[case("quote\"d", "back\\slash")]
fn test_template_escapes_strings(#[case] name: &str, #[case] package: &str) {
    let cmd = CmdInit {
        name: None,
        versions: vec!["3.9".to_string()],
        packages: vec![package.to_string()],
    };

    let spec = pipy::ProjectSpec::from_toml(&cmd.template(name), Path::new("pyproject.toml"))
        .expect("template should parse");

    assert_eq!(spec.name, name);
    assert_eq!(spec.environment("base").unwrap().packages, vec![package]);
}

#[tokio::test]
async fn test_init_appends_to_existing_pyproject() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("pyproject.toml");
    std::fs::write(&path, "[project]\nname = \"demo\"\n").unwrap();
    let ctx = Context::new(path.clone(), pipy::Config::default());

    let mut cmd = CmdInit {
        name: Some("demo".to_string()),
        versions: vec!["3.11".to_string()],
        packages: Vec::new(),
    };
    assert_eq!(cmd.run(&ctx).await.unwrap(), 0);

    let spec = pipy::ProjectSpec::load(&path).unwrap();
    assert_eq!(spec.versions, vec!["3.11"]);
    assert!(std::fs::read_to_string(&path).unwrap().starts_with("[project]"));

    assert!(cmd.run(&ctx).await.is_err(), "a second init must not duplicate the table");
}
