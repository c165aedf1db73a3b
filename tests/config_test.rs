// tests/config_test.rs
use release_train::config::{load_workspace, SprintVersion, LOCAL_CONFIG_FILE};
use release_train::ReleaseError;
use serial_test::serial;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Runs `f` with the current directory set to `dir`
fn in_dir<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
    let previous = env::current_dir().unwrap();
    env::set_current_dir(dir).unwrap();
    let result = f();
    env::set_current_dir(previous).unwrap();
    result
}

#[test]
fn test_load_from_explicit_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    let toml_content = r#"
name = "shop"
sprint_version = "next"

[[projects]]
name = "api"
path = "api"
"#;
    temp_file.write_all(toml_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let ws = load_workspace(Some(temp_file.path().to_str().unwrap())).unwrap();
    let root = temp_file.path().parent().unwrap();
    assert_eq!(ws.name, "shop");
    assert_eq!(ws.sprint_version, SprintVersion::Next);
    assert_eq!(ws.root, root);
    assert_eq!(ws.projects[0].path, root.join("api"));
}

#[test]
fn test_explicit_file_missing() {
    let result = load_workspace(Some("/definitely/not/here/workspace.toml"));
    match result {
        Err(ReleaseError::Config(message)) => assert!(message.contains("cannot read")),
        other => panic!("unexpected result: {:?}", other.map(|w| w.name)),
    }
}

#[test]
#[serial]
fn test_local_file_is_found() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(LOCAL_CONFIG_FILE),
        "[[projects]]\nname = \"web\"\npath = \"web\"\n",
    )
    .unwrap();

    let ws = in_dir(dir.path(), || load_workspace(None)).unwrap();
    assert_eq!(ws.projects.len(), 1);
    assert_eq!(ws.projects[0].name, "web");
    assert_eq!(ws.projects[0].path, PathBuf::from("./web"));
    assert_eq!(ws.records_path(), PathBuf::from("./.release-train/releases"));
}

#[test]
#[serial]
fn test_invalid_local_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(LOCAL_CONFIG_FILE), "projects = []\n").unwrap();

    let result = in_dir(dir.path(), || load_workspace(None));
    assert!(matches!(result, Err(ReleaseError::Config(_))));
}
