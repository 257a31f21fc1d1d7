// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for run-vault

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;
use std::thread;
use tempfile::tempdir;

/// Serve a fake metadata service answering the token and local-ipv4 requests
fn fake_metadata(ip: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for body in ["test-token", ip] {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
        }
    });

    format!("http://{addr}/latest")
}

fn write_defaults(dir: &Path, extra: &str) -> std::path::PathBuf {
    let path = dir.join("defaults.toml");
    std::fs::write(&path, format!("required_tools = []\n{extra}")).unwrap();
    path
}

/// Test the help output
#[test]
fn test_help_command() {
    let mut cmd = Command::cargo_bin("run-vault").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--tls-cert-file"))
        .stdout(predicate::str::contains("--enable-s3-backend"))
        .stdout(predicate::str::contains("--auto-unseal-kms-key-id"));
}

/// Unknown flags exit 1 with usage on stderr
#[test]
fn test_unrecognized_option() {
    let mut cmd = Command::cargo_bin("run-vault").unwrap();
    cmd.arg("--frobnicate");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"))
        .stderr(predicate::str::contains("--frobnicate"));
}

/// Missing TLS certificate is reported by name
#[test]
fn test_missing_tls_cert() {
    let mut cmd = Command::cargo_bin("run-vault").unwrap();
    cmd.arg("--tls-key-file").arg("/a/key");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("--tls-cert-file"))
        .stderr(predicate::str::contains("ERROR"))
        .stderr(predicate::str::contains("Usage"));
}

/// S3 backend without a bucket names --s3-bucket
#[test]
fn test_s3_backend_without_bucket() {
    let mut cmd = Command::cargo_bin("run-vault").unwrap();
    cmd.args([
        "--tls-cert-file=/a/crt",
        "--tls-key-file=/a/key",
        "--enable-s3-backend",
        "--s3-bucket-region=us-east-1",
    ]);
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("'--s3-bucket'"));
}

/// A missing prerequisite tool is named
#[test]
fn test_missing_dependency() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("defaults.toml");
    std::fs::write(&path, "required_tools = [\"no-such-tool-7d3b\"]\n").unwrap();

    let mut cmd = Command::cargo_bin("run-vault").unwrap();
    cmd.arg("--defaults")
        .arg(&path)
        .args(["--tls-cert-file=/a/crt", "--tls-key-file=/a/key"]);
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("no-such-tool-7d3b"));
}

/// Malformed defaults file fails cleanly
#[test]
fn test_invalid_defaults_file() {
    let temp_dir = tempdir().unwrap();
    let path = write_defaults(temp_dir.path(), "port = \"not a number\"\n");

    let mut cmd = Command::cargo_bin("run-vault").unwrap();
    cmd.arg("--defaults")
        .arg(&path)
        .args(["--tls-cert-file=/a/crt", "--tls-key-file=/a/key"]);
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load defaults"));
}

/// Misspelled keys in the defaults file are not silently ignored
#[test]
fn test_defaults_file_unknown_key() {
    let temp_dir = tempdir().unwrap();
    let path = write_defaults(temp_dir.path(), "metadata_timeout = 3\n");

    let mut cmd = Command::cargo_bin("run-vault").unwrap();
    cmd.arg("--defaults")
        .arg(&path)
        .args(["--tls-cert-file=/a/crt", "--tls-key-file=/a/key"]);
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load defaults"))
        .stderr(predicate::str::contains("metadata_timeout"));
}

/// Full resolve and render with a fake metadata service and Vault binary
#[test]
fn test_dry_run_end_to_end() {
    let temp_dir = tempdir().unwrap();
    let config_dir = temp_dir.path().join("config");
    let bin_dir = temp_dir.path().join("bin");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::create_dir_all(&bin_dir).unwrap();

    let vault = bin_dir.join("vault");
    std::fs::write(&vault, "#!/bin/sh\necho \"Vault v1.2.0 ('deadbeef')\"\n").unwrap();
    std::fs::set_permissions(&vault, std::fs::Permissions::from_mode(0o755)).unwrap();

    let endpoint = fake_metadata("10.0.0.5");
    let defaults = write_defaults(
        temp_dir.path(),
        &format!(
            "metadata_endpoint = \"{endpoint}\"\nunit_path = \"{}\"\n",
            temp_dir.path().join("vault.service").display()
        ),
    );

    let mut cmd = Command::cargo_bin("run-vault").unwrap();
    cmd.arg("--defaults")
        .arg(&defaults)
        .arg("--config-dir")
        .arg(&config_dir)
        .arg("--bin-dir")
        .arg(&bin_dir)
        .args([
            "--tls-cert-file=/a/crt",
            "--tls-key-file=/a/key",
            "--user=vault",
            "--dry-run",
        ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ui = true"))
        .stdout(predicate::str::contains("\"0.0.0.0:8200\""))
        .stdout(predicate::str::contains("\"0.0.0.0:8201\""))
        .stdout(predicate::str::contains("cluster_addr = \"https://10.0.0.5:8201\""))
        .stdout(predicate::str::contains("\"https://10.0.0.5:8200\""))
        .stdout(predicate::str::contains("User=vault"))
        .stdout(predicate::str::contains("[Install]"))
        .stdout(predicate::str::contains("# effective defaults"))
        .stdout(predicate::str::contains(format!("metadata_endpoint = \"{endpoint}\"")));

    assert!(!config_dir.join("default.hcl").exists());
    assert!(!temp_dir.path().join("vault.service").exists());
}
