//! Stamps `RETOUCH_GIT_HASH` and `RETOUCH_BUILD_DATE` into the binary for
//! `retouch version`. Both fall back to `unknown` outside a git checkout or
//! without a `date` command.

use std::process::Command;

fn main() {
    let git_hash = command_stdout("git", &["rev-parse", "--short", "HEAD"]);
    println!("cargo:rustc-env=RETOUCH_GIT_HASH={}", git_hash);

    println!("cargo:rustc-env=RETOUCH_BUILD_DATE={}", build_date());

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
}

/// UTC build date as YYYY-MM-DD, pinned by `SOURCE_DATE_EPOCH` when set.
fn build_date() -> String {
    match std::env::var("SOURCE_DATE_EPOCH") {
        Ok(epoch) if !epoch.trim().is_empty() => {
            command_stdout("date", &["-u", "-d", &format!("@{}", epoch.trim()), "+%Y-%m-%d"])
        }
        _ => command_stdout("date", &["-u", "+%Y-%m-%d"]),
    }
}

/// Trimmed stdout of a successful command, else `unknown`.
fn command_stdout(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
