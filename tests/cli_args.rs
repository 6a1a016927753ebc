//! Integration tests for CLI argument handling
//!
//! Runs the binary for the report subcommand and the cache commands that do
//! not need a network.

use std::process::Command;

use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_carimbo"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute carimbo")
}

const VALID_REPORT: &[&str] = &[
    "--cliente",
    "Sem sinal de internet",
    "--endereco",
    "Troca do conector",
    "--produto",
    "Reiniciar o modem",
    "--tecnico",
    "MC-42",
    "--test",
    "123456",
    "--power",
    "-19,5",
];

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("carimbo"), "Help should mention carimbo");
    assert!(stdout.contains("install"), "Help should mention install");
    assert!(stdout.contains("report"), "Help should mention report");
}

#[test]
fn test_report_help_explains_clipboard_piping() {
    let output = run_cli(&["report", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("stdout"), "help: {}", stdout);
    assert!(stdout.contains("clipboard"), "help: {}", stdout);
}

#[test]
fn test_report_prints_template_to_stdout() {
    let mut args = vec!["report", "reparo"];
    args.extend_from_slice(VALID_REPORT);
    let output = run_cli(&args);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("RELATÓRIO DE REPARO\n\n;DATA HORA: "));
    assert!(stdout.contains(";Código do Mapa de Calor: MC-42;"));
    assert!(stdout.contains(";OBSERVAÇÕES: N/A;"));
}

#[test]
fn test_report_instalacao() {
    let mut args = vec!["report", "instalacao", "--obs", "Tudo certo"];
    args.extend_from_slice(VALID_REPORT);
    let output = run_cli(&args);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("RELATÓRIO DE INSTALAÇÃO"));
    assert!(stdout.contains(";OBSERVAÇÕES: Tudo certo;"));
}

#[test]
fn test_report_with_missing_fields_lists_errors_and_fails() {
    let output = run_cli(&["report", "reparo", "--cliente", "Sem sinal de internet"]);

    assert!(!output.status.success(), "Expected invalid report to fail");
    assert!(output.stdout.is_empty(), "Nothing should be printed to copy");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("O campo \"Orientação ao cliente\" é obrigatório."));
    assert!(!stderr.contains("Reclamação do cliente"));
}

#[test]
fn test_invalid_report_kind_prints_error_and_exits() {
    let output = run_cli(&["report", "vistoria"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid report kind"),
        "Should print error message about invalid kind: {}",
        stderr
    );
}

#[test]
fn test_stores_on_empty_cache_dir() {
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = temp_dir.path().to_string_lossy().to_string();
    let config = temp_dir.path().join("config.toml");
    std::fs::write(&config, "").unwrap();
    let config = config.to_string_lossy().to_string();

    let output = run_cli(&["--config", &config, "--cache-dir", &cache_dir, "stores"]);

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_activate_without_install_fails() {
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = temp_dir.path().to_string_lossy().to_string();
    let config = temp_dir.path().join("config.toml");
    std::fs::write(&config, "").unwrap();
    let config = config.to_string_lossy().to_string();

    let output = run_cli(&["--config", &config, "--cache-dir", &cache_dir, "activate"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not installed"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.toml");
    let missing = missing.to_string_lossy().to_string();
    let output = run_cli(&["--config", &missing, "stores"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.toml"), "stderr: {}", stderr);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use carimbo::cli::{parse_report_kind, Cli, Command};
    use carimbo::report::ReportKind;
    use clap::Parser;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["carimbo"]).is_err());
    }

    #[test]
    fn test_cli_stores_subcommand() {
        let cli = Cli::parse_from(["carimbo", "stores"]);
        assert!(matches!(cli.command, Command::Stores));
    }

    #[test]
    fn test_parse_report_kind_installation_alias() {
        assert_eq!(parse_report_kind("installation").unwrap(), ReportKind::Instalacao);
    }

    #[test]
    fn test_parse_report_kind_invalid_returns_error() {
        assert!(parse_report_kind("vistoria").is_err());
    }
}
