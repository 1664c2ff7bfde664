use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn askdb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("askdb");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Create test documents
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.txt"),
        "Senior engineer resume. Python, Kubernetes, and PostgreSQL experience.\nLed the migration to a containerized deployment.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.txt"),
        "Performance review notes. Strong feedback on Python mentoring and code review quality.",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Infrastructure runbook covering Terraform, deployment pipelines, and rollback procedures.",
    )
    .unwrap();

    let config_content = format!(
        r#"[server]
bind = "127.0.0.1:7410"

[storage]
upload_dir = "{root}/data/uploads"
index_dir = "{root}/data/index"

[cache]
backend = "memory"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("askdb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_askdb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = askdb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run askdb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_ingest_reports_counts() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");

    let (stdout, stderr, success) = run_askdb(
        &config_path,
        &[
            "ingest",
            files.join("alpha.txt").to_str().unwrap(),
            files.join("beta.txt").to_str().unwrap(),
            files.join("gamma.txt").to_str().unwrap(),
        ],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("processed: 3"));
    assert!(stdout.contains("failed: 0"));
    assert!(stdout.contains("total documents: 3"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_ingest_tolerates_unsupported_files() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");
    fs::write(files.join("data.csv"), "a,b,c").unwrap();

    let (stdout, _, success) = run_askdb(
        &config_path,
        &[
            "ingest",
            files.join("alpha.txt").to_str().unwrap(),
            files.join("data.csv").to_str().unwrap(),
        ],
    );
    assert!(success, "batch should complete despite the bad file");
    assert!(stdout.contains("processed: 1"));
    assert!(stdout.contains("failed: 1"));
}

#[test]
fn test_search_ranks_by_keyword_matches() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");

    run_askdb(
        &config_path,
        &[
            "ingest",
            files.join("alpha.txt").to_str().unwrap(),
            files.join("beta.txt").to_str().unwrap(),
            files.join("gamma.txt").to_str().unwrap(),
        ],
    );

    // alpha matches python + deployment, gamma matches deployment only.
    let (stdout, stderr, success) =
        run_askdb(&config_path, &["search", "python deployment"]);
    assert!(success, "search failed: stderr={}", stderr);
    let alpha_pos = stdout.find("alpha.txt").expect("alpha in results");
    let gamma_pos = stdout.find("gamma.txt").expect("gamma in results");
    assert!(alpha_pos < gamma_pos, "alpha should rank above gamma:\n{}", stdout);
}

#[test]
fn test_search_empty_index_has_no_results() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_askdb(&config_path, &["search", "anything"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_index_persists_across_invocations() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");

    run_askdb(
        &config_path,
        &["ingest", files.join("gamma.txt").to_str().unwrap()],
    );

    // A separate process must reload the persisted index.
    let (stdout, _, success) = run_askdb(&config_path, &["search", "terraform rollback"]);
    assert!(success);
    assert!(stdout.contains("gamma.txt"));
}

#[test]
fn test_schema_on_empty_sqlite_database() {
    let (tmp, config_path) = setup_test_env();
    let db_path = tmp.path().join("empty.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());

    let (stdout, stderr, success) = run_askdb(&config_path, &["schema", &url]);
    assert!(success, "schema failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("database type: sqlite"));
    assert!(stdout.contains("tables: 0"));
    assert!(stdout.contains("relationships: 0"));
}

#[test]
fn test_classify_routes_queries() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, _) = run_askdb(&config_path, &["classify", "how many employees"]);
    assert_eq!(stdout.trim(), "sql");

    let (stdout, _, _) = run_askdb(&config_path, &["classify", "candidate skills"]);
    assert_eq!(stdout.trim(), "document");

    let (stdout, _, _) = run_askdb(
        &config_path,
        &["classify", "list all employees with python skills"],
    );
    assert_eq!(stdout.trim(), "hybrid");

    let (stdout, _, _) = run_askdb(&config_path, &["classify", "hello"]);
    assert_eq!(stdout.trim(), "sql");
}

#[test]
fn test_classify_works_without_config() {
    let (_tmp, _config) = setup_test_env();
    let binary = askdb_binary();
    let output = Command::new(&binary)
        .args(["--config", "/nonexistent/askdb.toml", "classify", "hello"])
        .output()
        .unwrap();
    assert!(output.status.success());
}
