use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test context that sets up an isolated hyprink home and working directory
struct TestContext {
    temp_dir: TempDir,
    home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config("")
    }

    fn with_config(extra: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let home = temp_dir.path().join("home");
        fs::create_dir_all(&home).expect("failed to create hyprink home");

        let log = home.join("hyprink.log");
        let config = format!(
            "[logging]\ncolors = false\nfile = {log:?}\n\n{extra}\n",
            log = log.to_string_lossy()
        );
        fs::write(home.join("hyprink.conf"), config).expect("failed to write config");

        Self { temp_dir, home }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.temp_dir.path().join(rel)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_hyprink"));
        cmd.current_dir(self.temp_dir.path());
        cmd.env("HYPRINK_HOME", &self.home);
        cmd.env_remove("HYPRINK_CONFIG");
        cmd.env_remove("HYPRINK_APP_NAME");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.cmd().args(args).output().expect("failed to run hyprink")
    }

    fn log(&self) -> String {
        fs::read_to_string(self.home.join("hyprink.log")).unwrap_or_default()
    }

    fn sample_dir(&self, name: &str) -> PathBuf {
        let dir = self.path(name);
        fs::create_dir_all(dir.join("bin")).unwrap();
        fs::write(dir.join("bin/tool"), "#!/bin/sh\necho tool\n").unwrap();
        fs::write(dir.join("README"), "hello").unwrap();
        dir
    }
}

fn arg(p: &Path) -> &str {
    p.to_str().unwrap()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("unpack"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    assert!(ctx.run(&["--version"]).status.success());
}

#[test]
fn test_pack_defaults_to_dirname_pkg() {
    let ctx = TestContext::new();
    ctx.sample_dir("project");

    let output = ctx.run(&["pack", "project"]);
    assert!(output.status.success(), "{output:?}");
    assert!(ctx.path("project.pkg").is_file());
    assert!(ctx.log().contains("[pack_ok]"));
}

#[test]
fn test_pack_missing_source_exit_code() {
    let ctx = TestContext::new();
    let output = ctx.run(&["pack", "/path/to/nothing", "-o", "output.pkg"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!ctx.path("output.pkg").exists());
    assert!(ctx.log().contains("/path/to/nothing"));
}

#[test]
fn test_roundtrip_through_cli() {
    let ctx = TestContext::new();
    let src = ctx.sample_dir("project");
    let pkg = ctx.path("out.pkg");
    let target = ctx.path("restored");

    assert!(ctx.run(&["pack", arg(&src), "-o", arg(&pkg)]).status.success());
    assert!(ctx.run(&["verify", arg(&pkg)]).status.success());
    assert!(ctx.run(&["unpack", arg(&pkg), arg(&target)]).status.success());
    assert_eq!(fs::read_to_string(target.join("README")).unwrap(), "hello");

    let again = ctx.run(&["unpack", arg(&pkg), arg(&target)]);
    assert_eq!(again.status.code(), Some(5));
}

#[test]
fn test_overwrite_from_config() {
    let ctx = TestContext::with_config("[packaging]\noverwrite = true\n");
    let src = ctx.sample_dir("project");
    let pkg = ctx.path("out.pkg");
    let target = ctx.path("restored");

    assert!(ctx.run(&["pack", arg(&src), "-o", arg(&pkg)]).status.success());
    assert!(ctx.run(&["unpack", arg(&pkg), arg(&target)]).status.success());
    assert!(ctx.run(&["unpack", arg(&pkg), arg(&target)]).status.success());
}

#[test]
fn test_list_json_and_table() {
    let ctx = TestContext::new();
    let src = ctx.sample_dir("project");
    let pkg = ctx.path("out.pkg");
    assert!(ctx.run(&["pack", arg(&src), "-o", arg(&pkg)]).status.success());

    let table = ctx.run(&["list", arg(&pkg)]);
    assert!(table.status.success());
    let stdout = String::from_utf8_lossy(&table.stdout);
    assert!(stdout.contains("bin/tool"));
    assert!(stdout.contains("README"));

    let json = ctx.run(&["list", "--json", arg(&pkg)]);
    assert!(json.status.success());
    let value: serde_json::Value = serde_json::from_slice(&json.stdout).unwrap();
    let entries = value["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["path"], "README");
    assert_eq!(entries[0]["kind"], "file");
}

#[test]
fn test_verify_rejects_foreign_file() {
    let ctx = TestContext::new();
    fs::write(ctx.path("notes.txt"), "not a package").unwrap();
    let output = ctx.run(&["verify", "notes.txt"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_install_into_configured_root() {
    let ctx = TestContext::new();
    let root = ctx.path("apps");
    let config = fs::read_to_string(ctx.home.join("hyprink.conf")).unwrap();
    fs::write(
        ctx.home.join("hyprink.conf"),
        format!("{config}\n[install]\nroot = {:?}\n", root.to_string_lossy()),
    )
    .unwrap();
    let src = ctx.sample_dir("project");

    let output = ctx.run(&["install", arg(&src)]);
    assert!(output.status.success(), "{output:?}");
    assert!(root.join("project/bin/tool").is_file());

    let again = ctx.run(&["install", arg(&src)]);
    assert_eq!(again.status.code(), Some(5));
}

#[test]
fn test_log_and_preset_commands() {
    let ctx = TestContext::with_config("[presets.deploy]\nlevel = \"warn\"\nmsg = \"{app} deployed\"\n");

    assert!(ctx.run(&["log", "error", "db", "connection lost"]).status.success());
    assert!(ctx.run(&["--app-name", "shop", "preset", "deploy"]).status.success());
    assert!(ctx.run(&["preset", "ghost"]).status.success());

    let log = ctx.log();
    assert!(log.contains("[ERROR] [db] connection lost"));
    assert!(log.contains("[WARN] [deploy] shop deployed"));
    assert!(log.contains("[WARN] [presets] unknown preset: ghost"));
}

#[test]
fn test_broken_config_falls_back_to_defaults() {
    let ctx = TestContext::new();
    fs::write(ctx.home.join("hyprink.conf"), "this is = = not toml").unwrap();

    let output = ctx.run(&["log", "info", "x", "still works"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[WARN] [config]"));
    assert!(stderr.contains("[INFO] [x] still works"));
}

#[test]
fn test_config_env_override() {
    let ctx = TestContext::new();
    let other = ctx.path("other.conf");
    let other_log = ctx.path("other.log");
    fs::write(
        &other,
        format!(
            "app_name = \"envapp\"\n[logging]\ncolors = false\nfile = {:?}\n",
            other_log.to_string_lossy()
        ),
    )
    .unwrap();

    let output = ctx
        .cmd()
        .env("HYPRINK_CONFIG", &other)
        .args(["preset", "info"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(
        fs::read_to_string(&other_log)
            .unwrap()
            .contains("envapp ready")
    );
}

#[test]
fn test_completions_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("hyprink"));
}
