//! Stamps the binary with the source revision and build date reported by
//! `qiot-deployer --version`

use std::process::Command;

fn revision() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty"])
        .output()
        .ok()?;
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    let built = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    println!(
        "cargo:rustc-env=GIT_HASH={}",
        revision().unwrap_or_else(|| "unknown".to_string())
    );
    println!("cargo:rustc-env=BUILD_TIME={}", built);
    println!("cargo:rerun-if-changed=.git/HEAD");
}
