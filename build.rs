use std::process::Command;

/// Embeds the commit and build profile shown by `chatview --version`
/// (`0.3.0 (<hash> <profile>)`).
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");

    // Empty outside a git checkout (e.g. a crates.io tarball).
    let hash = git(&["rev-parse", "--short=10", "HEAD"]).unwrap_or_default();
    let profile = std::env::var("PROFILE").unwrap_or_default();

    println!("cargo:rustc-env=CHATVIEW_BUILD_GIT_HASH={hash}");
    println!("cargo:rustc-env=CHATVIEW_BUILD_PROFILE={profile}");
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}
