use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn analyzes_every_target_platform() {
  let env = TestEnv::new();

  env
    .blens_cmd()
    .arg("analyze-size")
    .assert()
    .success()
    .stdout(predicate::str::contains("build/aplite/app.elf======"))
    .stdout(predicate::str::contains("build/basalt/app.elf======"))
    .stdout(predicate::str::contains(".text: 72 bytes (2 symbols)"))
    .stdout(predicate::str::contains(".bss: 516 bytes (2 symbols)"))
    .stdout(predicate::str::contains("\tmain").not());

  assert_eq!(env.events("cmd_success")[0]["command"], "analyze-size");
}

#[test]
fn verbose_lists_symbols_largest_first() {
  let env = TestEnv::new();

  let output = env.blens_cmd().args(["analyze-size", "--verbose"]).output().unwrap();

  assert!(output.status.success());
  let stdout = String::from_utf8(output.stdout).unwrap();
  let buffer = stdout.find("\ts_buffer").unwrap();
  let counter = stdout.find("\ts_counter").unwrap();
  assert!(buffer < counter);
}

#[test]
fn summary_overrides_verbose() {
  let env = TestEnv::new();

  env
    .blens_cmd()
    .args(["analyze-size", "--verbose", "--summary"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\ts_buffer").not());
}

#[test]
fn explicit_artifact_needs_no_project() {
  let env = TestEnv::new();

  env
    .blens_cmd()
    .current_dir(env.temp.path())
    .args(["analyze-size", "elsewhere/app.elf"])
    .assert()
    .success()
    .stdout(predicate::str::contains("======elsewhere/app.elf======"));
}

#[test]
fn missing_analyzer_is_reported() {
  let env = TestEnv::new();
  std::fs::remove_file(env.sdk_path().join("toolchain/bin/arm-none-eabi-nm")).unwrap();

  env
    .blens_cmd()
    .arg("analyze-size")
    .assert()
    .failure()
    .stderr(predicate::str::contains("arm-none-eabi-nm could not be found"));
}
