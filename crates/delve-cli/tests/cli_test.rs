//! Command-line entry points driven through `run_with`.
//!
//! Only commands that need no network are exercised here.

use clap::Parser;
use delve_cli::{run_with, Cli};
use tempfile::TempDir;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).expect("arguments parse")
}

#[tokio::test]
async fn test_config_init_then_load_it() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("delve.toml");
    let path_str = path.to_str().unwrap();

    run_with(parse(&["delve", "config", "--init", path_str]))
        .await
        .unwrap();
    assert!(path.exists());

    // The written file is a valid configuration for every other command
    run_with(parse(&["delve", "--config", path_str, "config"]))
        .await
        .unwrap();
    run_with(parse(&["delve", "--config", path_str, "tools", "--enable", "browser"]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missing_config_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");
    let result = run_with(parse(&["delve", "--config", missing.to_str().unwrap(), "tools"])).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("delve.toml");
    std::fs::write(&path, "[sandbox]\nprovider = \"remote\"\n").unwrap();

    let result = run_with(parse(&["delve", "--config", path.to_str().unwrap(), "tools"])).await;
    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("sandbox.endpoint"));
}

#[test]
fn test_help_lists_every_command() {
    let err = Cli::try_parse_from(["delve", "--help"]).unwrap_err();
    let help = err.to_string();
    for command in ["tools", "search", "browse", "sandbox", "config"] {
        assert!(help.contains(command), "help is missing {}", command);
    }
}
