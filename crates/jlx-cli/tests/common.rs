#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use serde_json::Value;
use tempfile::TempDir;

pub fn prepare_package(prefix: &str) -> (TempDir, PathBuf) {
    let temp = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("tempdir");
    let root = temp.path().join("mypkg");
    fs::create_dir_all(&root).expect("package dir");
    fs::write(
        root.join("jlx.toml"),
        "[project]\nname = \"mypkg\"\nenv-prefix = \"MYPKG_\"\ndepot = \"shared\"\n",
    )
    .expect("write jlx.toml");
    fs::write(root.join("Project.toml"), "name = \"mypkg\"\n").expect("write Project.toml");
    (temp, root)
}

/// A `julia` stand-in that only answers `--version`.
#[cfg(unix)]
pub fn fake_julia(dir: &Path, version: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir).expect("bin dir");
    let path = dir.join("julia");
    let script = format!(
        "#!/bin/sh\nfor arg in \"$@\"; do\n  if [ \"$arg\" = \"--version\" ]; then\n    echo \"julia version {version}\"\n    exit 0\n  fi\ndone\necho \"unsupported\" >&2\nexit 1\n"
    );
    fs::write(&path, script).expect("write fake julia");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}
