//! End-to-end tests of the `askdocs` binary.
//!
//! None of these reach a remote service: they cover commands that work
//! offline and the fail-fast paths taken before serving begins.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn askdocs_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("askdocs");
    path
}

/// Minimal valid PDF whose text layer is "annual leave pdf".
fn minimal_pdf() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 48 >> stream\nBT /F1 12 Tf 100 700 Td (annual leave pdf) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn setup_test_env(extra_config: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("leave-policy.txt"),
        "Annual Leave\n\nEmployees receive twenty days of paid leave per year.\n\nUnused leave may be carried forward into the first quarter.",
    )
    .unwrap();
    fs::write(docs_dir.join("handbook.pdf"), minimal_pdf()).unwrap();
    fs::write(docs_dir.join("notes.md"), "Markdown is not indexed.").unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[index]
dir = "{root}/index"
docs_dir = "{root}/docs"

[chunking]
chunk_size = 12
overlap = 3

[server]
bind = "127.0.0.1:0"
{extra}
"#,
        root = root.display(),
        extra = extra_config
    );
    let config_path = config_dir.join("askdocs.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_askdocs(config_path: &Path, args: &[&str], env: &[(&str, &str)]) -> (String, String, bool) {
    let binary = askdocs_binary();
    let mut cmd = Command::new(&binary);
    cmd.arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .env_remove("HUGGINGFACE_API_KEY");
    for (key, value) in env {
        cmd.env(key, value);
    }
    let output = cmd
        .output()
        .unwrap_or_else(|e| panic!("Failed to run askdocs binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_tools_list_needs_no_config() {
    let (stdout, stderr, success) = run_askdocs(
        Path::new("/nonexistent/askdocs.toml"),
        &["tools", "list"],
        &[],
    );
    assert!(success, "tools list failed: {}", stderr);
    assert!(stdout.contains("get_current_date"));
    assert!(stdout.contains("retrieve_documents_tool"));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_askdocs(
        Path::new("/nonexistent/askdocs.toml"),
        &["ask", "hello"],
        &[],
    );
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_chunking_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("askdocs.toml");
    fs::write(
        &config_path,
        "[index]\ndir = \"idx\"\n\n[chunking]\nchunk_size = 10\noverlap = 10\n",
    )
    .unwrap();

    let (_, stderr, success) = run_askdocs(&config_path, &["index", "build", "--dry-run"], &[]);
    assert!(!success);
    assert!(stderr.contains("overlap must be smaller"));
}

#[test]
fn test_index_build_dry_run() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) =
        run_askdocs(&config_path, &["index", "build", "--dry-run"], &[]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents: 2"));
    assert!(stdout.contains("chunks:"));
}

#[test]
fn test_index_build_requires_api_key() {
    let (tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_askdocs(&config_path, &["index", "build"], &[]);
    assert!(!success);
    assert!(stderr.contains("HUGGINGFACE_API_KEY"));
    assert!(!tmp.path().join("index").join("index.bin").exists());
}

#[test]
fn test_ask_fails_fast_without_keys() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_askdocs(&config_path, &["ask", "How much leave?"], &[]);
    assert!(!success);
    assert!(stderr.contains("HUGGINGFACE_API_KEY"));
}

#[test]
fn test_ask_rejects_blank_query() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_askdocs(
        &config_path,
        &["ask", "   "],
        &[("OPENAI_API_KEY", "sk-test"), ("HUGGINGFACE_API_KEY", "hf-test")],
    );
    assert!(!success);
    assert!(stderr.contains("query must not be empty"));
    assert!(stdout.is_empty());
}

#[test]
fn test_serve_fails_fast_without_index() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_askdocs(
        &config_path,
        &["serve"],
        &[("OPENAI_API_KEY", "sk-test"), ("HUGGINGFACE_API_KEY", "hf-test")],
    );
    assert!(!success);
    assert!(stderr.contains("askdocs index build"));
}

#[test]
fn test_sqlite_memory_requires_path() {
    let (_tmp, config_path) = setup_test_env("\n[memory]\nbackend = \"sqlite\"\n");

    let (_, stderr, success) = run_askdocs(&config_path, &["ask", "hello"], &[]);
    assert!(!success);
    assert!(stderr.contains("memory.path"));
}
