use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(xdg_config.join("sheetdrive")).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn write_config(&self, toml: &str) {
        fs::write(self.xdg_config.join("sheetdrive/config.toml"), toml)
            .expect("failed to write config");
    }

    fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.home.join(name);
        fs::write(&path, content).expect("failed to write fixture");
        path
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("sheetdrive"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("SHEETDRIVE_CREDENTIALS_B64")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute sheetdrive: {e}"))
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn help_lists_commands() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["init", "ls", "cat", "write", "rm", "range", "plan"] {
        assert!(stdout.contains(command), "help is missing {command}: {stdout}");
    }
}

#[test]
fn plan_help_lists_transitions() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &["plan", "--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["create", "next", "blocked", "review", "start", "done", "block", "flag"] {
        assert!(stdout.contains(command), "plan help is missing {command}");
    }
}

#[test]
fn missing_spreadsheet_id_is_reported() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &["ls"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no spreadsheet id"));
}

#[test]
fn missing_credentials_is_auth_error() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &["--spreadsheet", "sheet-123", "ls"]);
    assert!(!output.status.success());

    let err = stderr(&output);
    assert!(err.contains("error (auth)"), "unexpected stderr: {err}");
    assert!(err.contains("hint:"), "missing hint: {err}");
}

#[test]
fn incomplete_credential_file_is_auth_error() {
    let env = CliTestEnv::new();
    let path = env.write_file(
        "creds.json",
        r#"{"type": "service_account", "project_id": "demo", "client_email": "bot@demo.iam"}"#,
    );
    let output = run_bin(
        &env,
        &[
            "--spreadsheet",
            "sheet-123",
            "--credentials",
            path.to_str().expect("utf-8 path"),
            "plan",
            "next",
        ],
    );
    assert!(!output.status.success());

    let err = stderr(&output);
    assert!(err.contains("error (auth)"), "unexpected stderr: {err}");
    assert!(err.contains("private_key"), "missing field not named: {err}");
}

#[test]
fn spreadsheet_id_can_come_from_config() {
    let env = CliTestEnv::new();
    env.write_config("[sheets]\nspreadsheet_id = \"from-config\"\n");
    let output = run_bin(&env, &["ls"]);
    assert!(!output.status.success());
    // Gets past the spreadsheet id check and fails on credentials instead.
    assert!(stderr(&output).contains("error (auth)"));
}

#[test]
fn invalid_config_is_config_error() {
    let env = CliTestEnv::new();
    env.write_config("[retry]\nmax_attempts = 0\n");
    let output = run_bin(&env, &["--spreadsheet", "sheet-123", "ls"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("error (config)"));
}

#[test]
fn verbose_flag_is_accepted() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &["--verbose", "--spreadsheet", "sheet-123", "ls"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("error (auth)"));
}
