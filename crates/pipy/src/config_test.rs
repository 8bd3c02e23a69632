// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use rstest::rstest;
use tempfile::TempDir;

use super::*;

#[rstest]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.runtime, "docker");
    assert_eq!(config.workdir, "/src");
    assert_eq!(config.jobs, 1);
    assert_eq!(config.lock_filename, "pipy.lock.toml");
    assert!(config.cache_dir.is_none());
}

#[rstest]
#[case("3.9", "python:3.9")]
#[case("3.12-slim", "python:3.12-slim")]
fn test_image_for(#[case] version: &str, #[case] expected: &str) {
    assert_eq!(Config::default().image_for(version), expected);
}

#[rstest]
fn test_lock_path() {
    let config = Config::default();
    assert_eq!(
        config.lock_path(Path::new("/project")),
        Path::new("/project/pipy.lock.toml")
    );
}

#[rstest]
fn test_load_from_missing_file_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let config = Config::load_from(Some(&tmp.path().join("absent.toml"))).unwrap();
    assert_eq!(config.image, "python:{version}");
    assert_eq!(config.shell, "bash");
}

#[rstest]
fn test_load_from_file_overrides() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(
        &path,
        "image = \"ghcr.io/acme/python:{version}\"\njobs = 0\nmount_docker_socket = false\n",
    )
    .unwrap();

    let config = Config::load_from(Some(&path)).unwrap();
    assert_eq!(config.image_for("3.10"), "ghcr.io/acme/python:3.10");
    assert!(!config.mount_docker_socket);
    // zero jobs is clamped so version resolution still makes progress
    assert_eq!(config.jobs, 1);
    assert_eq!(config.runtime, "docker");
}
