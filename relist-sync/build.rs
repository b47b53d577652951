//! Build script for relist-sync
//!
//! Stamps `/health` build identification into the binary as `GIT_HASH`,
//! `BUILD_TIMESTAMP` (UTC, RFC 3339) and `BUILD_PROFILE`.

use std::process::Command;

const UNKNOWN: &str = "unknown";

/// Trimmed stdout of `git <args>`, or `None` outside a checkout
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    // Short hash with a -dirty suffix for uncommitted changes
    let git_hash = git(&["describe", "--always", "--dirty", "--abbrev=8"])
        .unwrap_or_else(|| UNKNOWN.to_string());

    let stamps = [
        ("GIT_HASH", git_hash),
        ("BUILD_TIMESTAMP", chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        ("BUILD_PROFILE", std::env::var("PROFILE").unwrap_or_else(|_| UNKNOWN.to_string())),
    ];
    for (name, value) in stamps {
        println!("cargo:rustc-env={}={}", name, value);
    }

    if let Some(head) = git(&["rev-parse", "--git-path", "HEAD"]) {
        println!("cargo:rerun-if-changed={}", head);
    }
    println!("cargo:rerun-if-changed=build.rs");
}
