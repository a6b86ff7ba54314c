use predicates::prelude::*;

use super::common::{BUILD_TOOL, TestEnv};

#[test]
fn build_succeeds_and_records_metrics() {
  let env = TestEnv::new();

  env
    .blens_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build finished"))
    .stdout(predicate::str::contains("text 1204 / data 20 / bss 512"));

  assert_eq!(env.build_runs(), 1);

  let built = env.events("app_build_succeeded");
  assert_eq!(built.len(), 1);
  assert_eq!(built[0]["has_js"], false);
  assert_eq!(built[0]["line_counts"]["c_line_count"], 5);
  assert_eq!(built[0]["resource_usage"]["resource_counts"]["image"], 1);
  assert_eq!(built[0]["resource_usage"]["resource_sizes"]["image"], 8);
  assert_eq!(built[0]["resource_usage"]["resource_sizes"]["raw"], 3);
  assert_eq!(built[0]["memory_usage"]["basalt"]["bss"], 512);

  let done = env.events("cmd_success");
  assert_eq!(done.len(), 1);
  assert_eq!(done[0]["command"], "build");
}

#[test]
fn build_json_output_is_valid() {
  let env = TestEnv::new();

  let output = env.blens_cmd().args(["build", "-o", "json"]).output().unwrap();

  assert!(output.status.success());
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["operation"], "build");
  assert_eq!(json["state"], "succeeded");
  assert_eq!(json["metrics"]["memory_usage"]["aplite"]["text"], 1204);
}

#[test]
fn clean_runs_distclean_without_metrics() {
  let env = TestEnv::new();
  env.write_file("project/build/aplite/app.elf", "");

  env
    .blens_cmd()
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Clean finished"));

  assert!(!env.project_path().join("build").exists());
  assert!(env.events("app_build_succeeded").is_empty());
  assert_eq!(env.events("cmd_success")[0]["command"], "clean");
}

#[test]
fn missing_compiler_is_reported_after_rerun() {
  let env = TestEnv::new();
  env.write_tool(
    "bin/waf",
    "echo run >> runs.log; echo 'Could not determine the compiler version' >&2; exit 1",
  );

  env
    .blens_cmd()
    .arg("build")
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("compiler/linker tools could not be found"));

  assert_eq!(env.build_runs(), 2);
  let failed = env.events("cmd_fail");
  assert_eq!(failed.len(), 1);
  assert_eq!(failed[0]["reason"], "missing compiler/linker");
  assert!(env.events("app_build_succeeded").is_empty());
}

#[test]
fn tee_diagnostics_classify_in_one_run() {
  let env = TestEnv::new();
  env.write_tool(
    "bin/waf",
    "echo run >> runs.log; echo \"region \\`APP' overflowed by 96 bytes\" >&2; exit 1",
  );

  env
    .blens_cmd()
    .args(["build", "--tee-diagnostics"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("overflowed by 96 bytes"))
    .stderr(predicate::str::contains("application is too large"));

  assert_eq!(env.build_runs(), 1);
  assert_eq!(env.events("cmd_fail")[0]["reason"], "app too big");
}

#[test]
fn unclassified_failure_is_a_compilation_error() {
  let env = TestEnv::new();
  env.write_tool("bin/waf", "echo 'main.c:3: error: expected ;' >&2; exit 1");

  env
    .blens_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("compilation error"));

  assert_eq!(env.events("cmd_fail")[0]["reason"], "compilation error");
}

#[test]
fn missing_build_tool_names_the_tool() {
  let env = TestEnv::new();
  std::fs::remove_file(env.sdk_path().join("bin").join("waf")).unwrap();

  env
    .blens_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("waf could not be found"));

  assert_eq!(env.events("cmd_fail")[0]["reason"], "tool not found");
}

#[test]
fn missing_resource_output_aborts() {
  let env = TestEnv::new();
  env.write_tool(
    "bin/waf",
    &BUILD_TOOL.replace("build/resources/images/logo.png.pbi", "/dev/null"),
  );

  env
    .blens_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains(
      "could not find generated resource corresponding to images/logo.png",
    ));

  let failed = env.events("cmd_fail");
  assert!(failed[0]["reason"].as_str().unwrap().starts_with("unhandled error:"));
}

#[test]
fn missing_size_tool_keeps_build_successful() {
  let env = TestEnv::new();
  std::fs::remove_file(env.sdk_path().join("toolchain/bin/arm-none-eabi-size")).unwrap();

  env
    .blens_cmd()
    .arg("build")
    .assert()
    .success()
    .stderr(predicate::str::contains("Could not collect memory usage analytics"));

  let built = env.events("app_build_succeeded");
  assert_eq!(built.len(), 1);
  assert_eq!(built[0]["memory_usage"], serde_json::json!({}));
}

#[test]
fn timeout_cancels_the_build() {
  let env = TestEnv::new();
  env.write_tool("bin/waf", "exec sleep 30");

  env
    .blens_cmd()
    .args(["build", "--timeout", "300ms"])
    .assert()
    .code(130)
    .stderr(predicate::str::contains("Timed out after 300ms"));

  assert_eq!(env.events("cmd_fail")[0]["reason"], "cancelled");
}

#[test]
fn no_telemetry_records_nothing() {
  let env = TestEnv::new();

  env.blens_cmd().args(["build", "--no-telemetry"]).assert().success();

  assert!(!env.telemetry_path().exists());
}

#[test]
fn telemetry_can_be_disabled_by_environment() {
  let env = TestEnv::new();

  env
    .blens_cmd()
    .arg("build")
    .env("BUILDLENS_TELEMETRY", "0")
    .assert()
    .success();

  assert!(env.telemetry().is_empty());
}

#[test]
fn project_dir_flag_selects_the_project() {
  let env = TestEnv::new();

  env
    .blens_cmd()
    .current_dir(env.temp.path())
    .arg("build")
    .arg("--project-dir")
    .arg(env.project_path())
    .assert()
    .success();

  assert_eq!(env.build_runs(), 1);
}
