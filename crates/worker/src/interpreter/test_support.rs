// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake interpreter scripts shared by interpreter tests.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable shell script standing in for an interpreter.
pub(crate) fn fake_interpreter(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(file, "{body}").unwrap();
    drop(file);
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// A fake interpreter reporting `version`, importing only `ok_pkg`, and
/// delegating any other invocation to the shell (so a supervisor can run
/// a script through it).
pub(crate) fn standard_fake(dir: &Path, version: &str) -> PathBuf {
    fake_interpreter(
        dir,
        "python3",
        &format!(
            r#"case "$1" in
  --version) echo "Python {version}"; exit 0;;
  -c) case "$2" in *ok_pkg*) exit 0;; *) exit 1;; esac;;
  *) exec /bin/sh "$@";;
esac"#
        ),
    )
}
