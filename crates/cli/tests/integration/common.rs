//! Shared test helpers for CLI integration tests.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

pub const APPINFO: &str = r#"{
  "targetPlatforms": ["aplite", "basalt"],
  "resources": { "media": [
    { "type": "png", "file": "images/logo.png" },
    { "type": "raw", "file": "data.bin" }
  ] }
}"#;

/// Build tool that records each run and lays out the expected outputs.
pub const BUILD_TOOL: &str = r#"
echo "$@" >> runs.log
if [ "$1" = "distclean" ]; then rm -rf build; exit 0; fi
mkdir -p build/aplite build/basalt build/resources/images
printf 'abcdefgh' > build/resources/images/logo.png.pbi
printf 'abc' > build/resources/data.bin
touch build/aplite/app.elf build/basalt/app.elf
"#;

pub const SIZE_TOOL: &str = r#"
echo '   text    data     bss     dec     hex filename'
echo "   1204      20     512    1736     6c8 $1"
"#;

pub const NM_TOOL: &str = r#"
cat <<'SYMBOLS'
00000010 00000004 b s_counter
00000000 00000010 D app_name
00000020 00000040 T main
00000060 00000008 t helper
00000070 00000200 B s_buffer
SYMBOLS
"#;

/// Isolated test environment: a project, a fake SDK, and private config/data dirs.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// A project with sources and a working fake SDK.
  pub fn new() -> Self {
    let env = Self {
      temp: TempDir::new().unwrap(),
    };
    env.write_file("project/appinfo.json", APPINFO);
    env.write_file("project/src/main.c", "#include <app.h>\n\nint main(void) {\n  return 0;\n}\n");
    env.write_tool("bin/waf", BUILD_TOOL);
    env.write_tool("toolchain/bin/arm-none-eabi-size", SIZE_TOOL);
    env.write_tool("toolchain/bin/arm-none-eabi-nm", NM_TOOL);
    env
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  /// Write an executable script relative to the SDK root.
  pub fn write_tool(&self, relative_path: &str, body: &str) -> PathBuf {
    let path = self.write_file(&format!("sdk/{}", relative_path), &format!("#!/bin/sh\n{}\n", body));
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
  }

  fn dir(&self, name: &str) -> PathBuf {
    let p = self.temp.path().join(name);
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn project_path(&self) -> PathBuf {
    self.dir("project")
  }

  pub fn sdk_path(&self) -> PathBuf {
    self.dir("sdk")
  }

  pub fn data_path(&self) -> PathBuf {
    self.dir("data")
  }

  /// Get a pre-configured Command for the blens binary, run from the project.
  ///
  /// Sets environment variables for isolated testing:
  /// - `BUILDLENS_SDK_ROOT`: the fake SDK
  /// - `XDG_CONFIG_HOME`: an empty config dir
  /// - `XDG_DATA_HOME`: isolated data path (for telemetry)
  pub fn blens_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("blens");
    cmd.current_dir(self.project_path());
    cmd.env("BUILDLENS_SDK_ROOT", self.sdk_path());
    cmd.env("XDG_CONFIG_HOME", self.dir("config"));
    cmd.env("XDG_DATA_HOME", self.data_path());
    for var in [
      "BUILDLENS_CONFIG",
      "BUILDLENS_BUILD_TOOL",
      "BUILDLENS_TOOLCHAIN_DIR",
      "BUILDLENS_DIAGNOSTICS",
      "BUILDLENS_TELEMETRY",
      "RUST_LOG",
    ] {
      cmd.env_remove(var);
    }
    cmd
  }

  pub fn telemetry_path(&self) -> PathBuf {
    self.data_path().join("buildlens").join("telemetry.jsonl")
  }

  /// Recorded telemetry, oldest first.
  pub fn telemetry(&self) -> Vec<Value> {
    match std::fs::read_to_string(self.telemetry_path()) {
      Ok(content) => content.lines().map(|l| serde_json::from_str(l).unwrap()).collect(),
      Err(_) => Vec::new(),
    }
  }

  /// Recorded telemetry events with the given name.
  pub fn events(&self, name: &str) -> Vec<Value> {
    self.telemetry().into_iter().filter(|e| e["event"] == name).collect()
  }

  /// How many times the fake build tool ran.
  pub fn build_runs(&self) -> usize {
    std::fs::read_to_string(self.project_path().join("runs.log"))
      .map(|s| s.lines().count())
      .unwrap_or(0)
  }
}
