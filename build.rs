use std::process::Command;

// RMP_GIT_SHA may be preset by packaging builds that run outside a checkout.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");
    println!("cargo:rerun-if-env-changed=RMP_GIT_SHA");

    let git_sha = std::env::var("RMP_GIT_SHA")
        .ok()
        .filter(|sha| !sha.trim().is_empty())
        .or_else(head_sha)
        .unwrap_or_else(|| "dev".to_string());

    println!("cargo:rustc-env=RMP_GIT_SHA={git_sha}");
}

fn head_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}
