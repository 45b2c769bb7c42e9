use predicates::prelude::*;

#[test]
fn help_lists_every_subcommand() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("verselex");
    cmd.arg("--help").assert().success().stdout(
        predicate::str::contains("lexicon")
            .and(predicate::str::contains("verses"))
            .and(predicate::str::contains("ingest"))
            .and(predicate::str::contains("query")),
    );
}

#[test]
fn query_dry_run_prints_panel_requests() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("verselex");
    cmd.args(["query", "--id", "G1411", "--book", "Acts", "--dry-run"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"by_book\"")
                .and(predicate::str::contains("\"hebrew_id\""))
                .and(predicate::str::contains("G1411"))
                .and(predicate::str::contains("Acts")),
        );
}

#[test]
fn verses_without_terms_is_a_usage_error() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("verselex");
    cmd.args(["verses", "--versions", "KJV"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--term"));
}

#[test]
fn malformed_term_fails_before_starting_a_browser() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("verselex");
    cmd.args([
        "verses",
        "--term",
        "Genesis",
        "--versions",
        "KJV",
        "--webdriver-url",
        "http://127.0.0.1:9",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid crawl input"));
}

#[test]
fn unknown_config_key_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("verselex.yaml");
    std::fs::write(&path, "webdriver:\n  port: 4444\n").unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("verselex");
    cmd.arg("--config")
        .arg(&path)
        .args(["query", "--word", "love", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("load config"));
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("verselex");
    cmd.env("RUST_LOG", "debug")
        .args(["query", "--word", "love", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
}
