use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use serde_json::Value;
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
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("yamak");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }
}

fn run_yamak(env: &CliTestEnv, args: &[&str]) -> Output {
    Command::new(PathBuf::from(assert_cmd::cargo::cargo_bin!("yamak")))
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute yamak: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "yamak {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

/// Payload bodies from dry-run output, which alternates a
/// `<mode> <url> <sent at>` line with a pretty-printed JSON body.
fn dry_run_payloads(stdout: &str) -> Vec<(String, Value)> {
    let mut payloads = Vec::new();
    let mut lines = stdout.lines().peekable();
    while let Some(header) = lines.next() {
        let mode = header.split_whitespace().next().unwrap_or_default().to_string();
        let mut body = String::new();
        while let Some(line) = lines.peek() {
            if line.starts_with("Request ") || line.starts_with("Beacon ") {
                break;
            }
            body.push_str(lines.next().unwrap());
            body.push('\n');
        }
        let value = serde_json::from_str(&body)
            .unwrap_or_else(|e| panic!("invalid payload JSON ({e}):\n{body}"));
        payloads.push((mode, value));
    }
    payloads
}

#[test]
fn status_without_config_uses_defaults() {
    let env = CliTestEnv::new();

    let output = run_yamak(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Yamak Configuration"));
    assert!(stdout.contains("not found, using defaults"));
    assert!(stdout.contains("Project ID:      <not set>"));
    assert!(stdout.contains("Endpoint:        https://app.yamak.io/collect"));
    assert!(stdout.contains("Status: Not ready"));

    let log_line = stdout
        .lines()
        .find(|line| line.starts_with("Log file:"))
        .expect("status prints the log file");
    let log_file = log_line.trim_start_matches("Log file:").trim();
    assert!(log_file.starts_with(&env.xdg_state.join("yamak").display().to_string()));
    let name = log_file.rsplit('/').next().unwrap();
    // yamak.YYYY-MM-DD.log, as written by the daily appender
    assert_eq!(name.len(), "yamak.2026-01-01.log".len());
    assert!(name.starts_with("yamak.") && name.ends_with(".log"));
}

#[test]
fn status_reads_config_file() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[tracker]
project_id = "site-cli"
track_outbound_links = true
exclude_paths = ["/admin/**"]

[transport]
timeout_secs = 4
"#,
    );

    let output = run_yamak(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Project ID:      site-cli"));
    assert!(stdout.contains("Outbound links:  enabled"));
    assert!(stdout.contains("Exclude paths:   /admin/**"));
    assert!(stdout.contains("Timeout:         4s"));
    assert!(stdout.contains("Status: Ready to send"));
}

#[test]
fn match_path_reports_each_path() {
    let env = CliTestEnv::new();
    let args = ["match-path", "/admin/**", "/admin/settings", "/about"];

    let output = run_yamak(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines, vec!["excluded  /admin/settings", "tracked   /about"]);
}

#[test]
fn track_dry_run_prints_payload() {
    let env = CliTestEnv::new();
    let args = [
        "track",
        "Signup",
        "--project",
        "site-cli",
        "--prop",
        "plan=pro",
        "--prop",
        "seats=3",
        "--dry-run",
    ];

    let output = run_yamak(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let payloads = dry_run_payloads(&stdout);
    assert_eq!(payloads.len(), 1);
    let (mode, body) = &payloads[0];
    assert_eq!(mode, "Request");
    assert_eq!(body["event"], "Signup");
    assert_eq!(body["websiteId"], "site-cli");
    assert_eq!(body["props"]["plan"], "pro");
    assert_eq!(body["props"]["seats"], 3);

    let header: Vec<_> = stdout.lines().next().unwrap().split_whitespace().collect();
    assert_eq!(header.len(), 3);
    assert!(header[1].ends_with("/collect"));
    // RFC 3339 send time in UTC
    assert!(header[2].contains('T') && header[2].ends_with("+00:00"));
}

#[test]
fn track_without_project_fails() {
    let env = CliTestEnv::new();

    let output = run_yamak(&env, &["track", "Signup", "--dry-run"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no project ID"));
}

#[test]
fn replay_dry_run_reports_page_views_and_unload() {
    let env = CliTestEnv::new();
    let args = [
        "replay",
        "--project",
        "site-cli",
        "--path",
        "/home",
        "--path",
        "/about",
        "--interval-ms",
        "0",
        "--dry-run",
    ];

    let output = run_yamak(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let payloads = dry_run_payloads(&stdout);
    assert_eq!(payloads.len(), 3);

    let (_, home) = &payloads[0];
    assert_eq!(home["event"], "Page Views");
    assert_eq!(home["props"]["path"], "/home");
    assert_eq!(home["props"]["uniqueViews"], "/home");

    let (_, about) = &payloads[1];
    assert_eq!(about["props"]["path"], "/about");
    assert_eq!(about["props"]["transitions"]["value"], "/home  ->  /about");
    assert_eq!(about["props"]["duration"]["value"], "/home - < 5s");

    let (mode, unload) = &payloads[2];
    assert_eq!(mode, "Beacon");
    assert_eq!(unload["update"], true);
    assert_eq!(unload["props"]["bounces"], "No");
}
