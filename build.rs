fn main() {
    let mut ci_tag = String::new();

    if let Ok(env) = std::env::var("BUILD_NUMBER_CI_TAG") {
        ci_tag = env.trim().to_string();
    } else if let Ok(tag) = std::fs::read(".tag") {
        if let Ok(s) = String::from_utf8(tag) {
            ci_tag = s.trim().to_string();
        }
    } else if let Ok(output) = std::process::Command::new("git")
        .args(["-c", "core.abbrev=8", "describe", "--tags", "--always"])
        .output()
    {
        if output.status.success() {
            let info = String::from_utf8_lossy(&output.stdout);
            ci_tag = info.trim().to_string();
        }
    }

    println!("cargo:rerun-if-changed=.tag");
    println!("cargo:rerun-if-env-changed=BUILD_NUMBER_CI_TAG");
    println!("cargo:rustc-env=BUILD_NUMBER_CI_TAG={ci_tag}");
}
