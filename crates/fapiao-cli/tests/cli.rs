use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn fapiao() -> Command {
    Command::cargo_bin("fapiao").unwrap()
}

#[test]
fn help_lists_commands() {
    fapiao()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn config_init_get_set_round() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");
    let config = config.to_str().unwrap();

    fapiao()
        .args(["-c", config, "config", "init"])
        .assert()
        .success();

    fapiao()
        .args(["-c", config, "config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    fapiao()
        .args(["-c", config, "config", "get", "extraction.mode"])
        .assert()
        .success()
        .stdout(predicate::str::contains("regex"));

    fapiao()
        .args(["-c", config, "config", "set", "extraction.mode", "vlm"])
        .assert()
        .success();

    fapiao()
        .args(["-c", config, "config", "get", "extraction.mode"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vlm"));

    fapiao()
        .args(["-c", config, "config", "set", "extraction.mode", "ocr"])
        .assert()
        .failure();
}

#[test]
fn config_path_reports_missing_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("absent.json");

    fapiao()
        .args(["-c", config.to_str().unwrap(), "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not created"));
}

#[test]
fn process_missing_file_fails() {
    fapiao()
        .args(["process", "does-not-exist.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn process_image_in_regex_mode_reports_failed_record() {
    let dir = TempDir::new().unwrap();
    let scan = dir.path().join("scan.png");
    std::fs::write(&scan, b"\x89PNG\r\n\x1a\n").unwrap();

    fapiao()
        .args(["process", "--mode", "regex", scan.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"source_name\": \"scan.png\""))
        .stdout(predicate::str::contains("requires vlm mode"));
}

#[test]
fn batch_without_matches_fails() {
    let dir = TempDir::new().unwrap();
    let pattern = format!("{}/*.pdf", dir.path().display());

    fapiao()
        .args(["batch", &pattern])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No matching files"));
}

#[test]
fn batch_keeps_going_past_broken_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.pdf"), b"not a pdf").unwrap();
    std::fs::write(dir.path().join("b.pdf"), b"also not a pdf").unwrap();
    let out = dir.path().join("out");
    let pattern = format!("{}/*.pdf", dir.path().display());

    fapiao()
        .args(["batch", &pattern, "--mode", "regex", "--summary", "-o"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 of 2 files failed"));

    fapiao()
        .args(["batch", &pattern, "--mode", "regex", "--summary", "--continue-on-error", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 successful, 2 failed"));

    let summary = std::fs::read_to_string(out.join("summary.csv")).unwrap();
    assert!(summary.starts_with("文件名,"));
    assert!(summary.contains("a.pdf"));
    assert!(summary.contains("b.pdf"));
}
