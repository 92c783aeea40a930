use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn setup() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("companion.toml");
    fs::write(
        &config_path,
        format!(
            r#"[workspace]
clone_dir = "{root}/temp_repo"
index_dir = "{root}/vector_index"

[embedding]
provider = "hash"
dims = 64

[llm]
provider = "mock"
"#,
            root = tmp.path().display()
        ),
    )
    .unwrap();
    (tmp, config_path)
}

fn companion(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_companion"))
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn status_without_index_is_not_analyzed() {
    let (_tmp, config) = setup();
    let out = companion(&config, &["status"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("not analyzed"));
    assert!(stdout.contains("hash-64"));
}

#[test]
fn status_json_is_parseable() {
    let (_tmp, config) = setup();
    let out = companion(&config, &["status", "--json"]);
    assert!(out.status.success());
    let status: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(status["ready"], false);
    assert_eq!(status["llm"], "mock");
}

#[test]
fn chat_before_analyze_fails_with_message() {
    let (_tmp, config) = setup();
    let out = companion(&config, &["chat", "what does this repo do?"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Repository not analyzed yet"), "{stderr}");
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[chunking]\nchunk_size = 100\noverlap = 100\n").unwrap();
    let out = companion(&config, &["status"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("overlap"));
}

#[test]
fn completions_need_no_config() {
    let out = Command::new(env!("CARGO_BIN_EXE_companion"))
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("companion"));
}

#[test]
fn status_with_hosted_llm_needs_no_api_key() {
    let (tmp, _) = setup();
    let config_path = tmp.path().join("gemini.toml");
    fs::write(
        &config_path,
        format!(
            r#"[workspace]
clone_dir = "{root}/temp_repo"
index_dir = "{root}/vector_index"

[embedding]
provider = "hash"
dims = 64
"#,
            root = tmp.path().display()
        ),
    )
    .unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_companion"))
        .arg("--config")
        .arg(&config_path)
        .args(["status", "--json"])
        .env_remove("GOOGLE_API_KEY")
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let status: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(status["llm"], "gemini");
}
