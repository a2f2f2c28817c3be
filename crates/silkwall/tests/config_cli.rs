use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn silkwall(config_dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_silkwall"));
    command
        .env("SILKWALL_CONFIG_DIR", config_dir)
        .env_remove("RUST_LOG");
    command
}

#[test]
fn config_where_reports_override_directory() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");

    let output = silkwall(&config_dir)
        .args(["config", "where"])
        .output()
        .expect("failed to run silkwall config where");

    assert!(output.status.success());
    let printed = String::from_utf8(output.stdout).unwrap();
    assert_eq!(
        printed.trim(),
        config_dir.join("silkwall.toml").display().to_string()
    );
}

#[test]
fn config_init_creates_file_once() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");
    let config_file = config_dir.join("silkwall.toml");

    let status = silkwall(&config_dir)
        .args(["config", "init"])
        .status()
        .expect("failed to run silkwall config init");
    assert!(status.success());

    let written = fs::read_to_string(&config_file).unwrap();
    assert!(written.contains("version = 1"));
    assert!(written.contains("[field]"));
    assert!(written.contains("color = \"#3b82f6\""));

    let second = silkwall(&config_dir)
        .args(["config", "init"])
        .status()
        .expect("failed to rerun silkwall config init");
    assert!(!second.success());

    let forced = silkwall(&config_dir)
        .args(["config", "init", "--force"])
        .status()
        .expect("failed to run silkwall config init --force");
    assert!(forced.success());
}
