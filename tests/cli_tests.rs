#![cfg(unix)]

mod common;

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use common::FakeTools;
use predicates::prelude::*;

/// Writes a config file pointing the binary at the fake tools and returns its
/// path together with the test directory.
fn setup(tools: &FakeTools) -> (PathBuf, PathBuf) {
    let suite = tools.root().join("suite");
    fs::create_dir_all(&suite).unwrap();
    let config = tools.root().join("simtest.yaml");
    fs::write(
        &config,
        format!(
            "project_top: {top}\n\
             compiler_dir: {tools}\n\
             bin_dir: {tools}\n\
             obj_dir: {top}/obj\n\
             default_timeout: 5.0\n\
             build_timeout: 5.0\n\
             use_colors: false\n",
            top = tools.root().display(),
            tools = tools.tools().display(),
        ),
    )
    .unwrap();
    (config, suite)
}

fn simtest(config: &PathBuf, suite: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("simtest").unwrap();
    cmd.env_remove("SIMTEST_PROJECT_TOP")
        .env_remove("SIMTEST_COMPILER_DIR")
        .arg("--config")
        .arg(config)
        .arg("--dir")
        .arg(suite);
    cmd
}

#[test]
fn empty_suite_reports_nothing_failed() {
    let tools = FakeTools::new();
    let (config, suite) = setup(&tools);

    simtest(&config, &suite)
        .assert()
        .success()
        .stdout(predicate::str::contains("0/0 tests failed"));
}

#[test]
fn unknown_test_name_exits_nonzero() {
    let tools = FakeTools::new();
    let (config, suite) = setup(&tools);

    simtest(&config, &suite)
        .arg("foo")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Unknown test foo"))
        .stdout(predicate::str::contains("tests failed").not());
}

#[test]
fn passing_suite_exits_zero() {
    let tools = FakeTools::new();
    let (config, suite) = setup(&tools);
    fs::write(suite.join("hello.c"), "// OUT: hello\n// CHECK: hello\n").unwrap();
    fs::write(suite.join("ok.S"), "# OUT: PASS\n").unwrap();

    simtest(&config, &suite)
        .assert()
        .success()
        .stdout(predicate::str::contains("hello.c (verilator)"))
        .stdout(predicate::str::contains("hello.c (emulator)"))
        .stdout(predicate::str::contains("ok.S (emulator)"))
        .stdout(predicate::str::contains("[PASS]"))
        .stdout(predicate::str::contains("0/4 tests failed"));
}

#[test]
fn failing_test_is_listed_and_exits_nonzero() {
    let tools = FakeTools::new();
    let (config, suite) = setup(&tools);
    fs::write(suite.join("good.c"), "// OUT: yes\n// CHECK: yes\n").unwrap();
    fs::write(suite.join("bad.c"), "// OUT: yes\n// CHECK: no\n").unwrap();

    simtest(&config, &suite)
        .args(["--target", "emulator"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("[FAIL]"))
        .stdout(predicate::str::contains("Failing tests:"))
        .stdout(predicate::str::contains("expected string no was not found"))
        .stdout(predicate::str::contains("1/2 tests failed"));
}

#[test]
fn named_tests_restrict_the_run() {
    let tools = FakeTools::new();
    let (config, suite) = setup(&tools);
    fs::write(suite.join("one.c"), "// OUT: one\n// CHECK: one\n").unwrap();
    fs::write(suite.join("two.c"), "// CHECK: missing\n").unwrap();

    simtest(&config, &suite)
        .args(["--target", "emulator", "one.c"])
        .assert()
        .success()
        .stdout(predicate::str::contains("one.c (emulator)"))
        .stdout(predicate::str::contains("two.c").not())
        .stdout(predicate::str::contains("0/1 tests failed"));
}

#[test]
fn bad_config_file_is_reported() {
    let tools = FakeTools::new();
    let (_, suite) = setup(&tools);
    let config = tools.root().join("bad.yaml");
    fs::write(&config, "no_such_key: 1\n").unwrap();

    simtest(&config, &suite)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no_such_key"));
}
