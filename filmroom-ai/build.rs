//! Build script for filmroom-ai
//!
//! Exposes GIT_HASH, BUILD_TIMESTAMP and BUILD_PROFILE to the binary, which
//! logs them at startup so a run's artifacts can be traced to a build.

use std::process::Command;

fn git_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn main() {
    let hash = git_hash().unwrap_or_else(|| "unknown".to_string());
    let timestamp = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", hash);
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", timestamp);
    println!("cargo:rustc-env=BUILD_PROFILE={}", profile);
}
