// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

use httptest::{matchers::*, responders::*, Expectation, Server};
use rstest::rstest;
use serde_json::json;

use super::*;

fn release_file(filename: &str, python_version: &str) -> ReleaseFile {
    ReleaseFile {
        filename: filename.to_string(),
        url: format!("https://files.example/{filename}"),
        python_version: python_version.to_string(),
        digests: BTreeMap::new(),
    }
}

fn resolver_for(server: &Server) -> PypiHashResolver {
    let config = Config {
        index_url: server.url_str("/pypi/"),
        ..Default::default()
    };
    PypiHashResolver::new(&config).unwrap()
}

#[rstest]
fn test_python_tags_expands_minor_versions() {
    let tags = python_tags("3.9");
    for expected in ["3.9", "cp39", "py3", "py3.9", "py39", "source", "py2.py3"] {
        assert!(tags.contains(expected), "missing {expected}");
    }
    assert_eq!(tags.len(), 7);
    assert!(python_tags("3.10").contains("cp310"));
}

#[rstest]
#[case("3")]
#[case("3.9.1")]
#[case("pypy3.9")]
#[case("3.100")]
fn test_python_tags_passes_through_other_shapes(#[case] version: &str) {
    assert_eq!(
        python_tags(version).into_iter().collect::<Vec<_>>(),
        vec![version.to_string()]
    );
}

#[rstest]
fn test_matching_files_filters_by_interpreter() {
    let files = vec![
        release_file("a-1.0-cp38-cp38-manylinux1_x86_64.whl", "cp38"),
        release_file("a-1.0-cp39-cp39-manylinux1_x86_64.whl", "cp39"),
        release_file("a-1.0-py3-none-any.whl", "py3"),
        release_file("a-1.0.tar.gz", "source"),
    ];
    let names: Vec<&str> = matching_files(&files, "3.9")
        .into_iter()
        .map(|f| f.filename.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "a-1.0-cp39-cp39-manylinux1_x86_64.whl",
            "a-1.0-py3-none-any.whl",
            "a-1.0.tar.gz"
        ]
    );
}

#[rstest]
fn test_sha512_hex() {
    assert_eq!(
        sha512_hex(b"abc"),
        "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
         2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
    );
}

#[tokio::test]
async fn test_resolver_downloads_and_hashes_matching_files() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/pypi/demo/1.0/json")).respond_with(
            json_encoded(json!({
                "urls": [
                    {
                        "filename": "demo-1.0-py3-none-any.whl",
                        "url": server.url_str("/files/demo-1.0-py3-none-any.whl"),
                        "python_version": "py3",
                        "digests": {"sha256": "ignored"}
                    },
                    {
                        "filename": "demo-1.0-cp27-none-any.whl",
                        "url": server.url_str("/files/demo-1.0-cp27-none-any.whl"),
                        "python_version": "cp27",
                        "digests": {}
                    },
                    {
                        "filename": "demo-1.0.tar.gz",
                        "url": server.url_str("/files/demo-1.0.tar.gz"),
                        "python_version": "source",
                        "digests": {"sha512": "ABCDEF"}
                    }
                ]
            })),
        ),
    );
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            "/files/demo-1.0-py3-none-any.whl",
        ))
        .respond_with(status_code(200).body("wheel-bytes")),
    );

    let hashes = resolver_for(&server)
        .hashes("demo", "1.0", "3.9")
        .await
        .unwrap();

    let mut expected = vec![sha512_hex(b"wheel-bytes"), "abcdef".to_string()];
    expected.sort();
    assert_eq!(hashes, expected);
}

#[tokio::test]
async fn test_resolver_reports_missing_release() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/pypi/ghost/9.9/json"))
            .respond_with(status_code(404)),
    );

    let err = resolver_for(&server)
        .hashes("ghost", "9.9", "3.9")
        .await
        .unwrap_err();
    match err {
        crate::Error::HashLookup {
            package, version, ..
        } => {
            assert_eq!(package, "ghost");
            assert_eq!(version, "9.9");
        }
        other => panic!("expected hash lookup error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_resolver_rejects_release_without_matching_files() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/pypi/old/1.0/json")).respond_with(
            json_encoded(json!({
                "urls": [{
                    "filename": "old-1.0-cp27-none-any.whl",
                    "url": server.url_str("/files/old.whl"),
                    "python_version": "cp27"
                }]
            })),
        ),
    );

    let err = resolver_for(&server)
        .hashes("old", "1.0", "3.9")
        .await
        .unwrap_err();
    assert!(matches!(err, crate::Error::HashLookup { .. }));
}
