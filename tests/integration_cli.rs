//! Tests for the `photo-catalog` binary.
//!
//! These run the real executable against a temporary library:
//! - An interrupt mid-scan finalizes the session instead of abandoning it

#![cfg(unix)]

use rusqlite::Connection;
use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn stored_files(db: &Path) -> Option<i64> {
    if !db.exists() {
        return None;
    }
    let conn = Connection::open(db).ok()?;
    conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
        .ok()
}

#[test]
fn interrupt_finalizes_the_running_session() {
    let temp_dir = TempDir::new().unwrap();
    let library = temp_dir.path().join("library");
    fs::create_dir_all(&library).unwrap();
    for i in 0..30_000 {
        File::create(library.join(format!("img{:05}.jpg", i))).unwrap();
    }

    let config = temp_dir.path().join("scan_targets.yaml");
    fs::write(
        &config,
        format!(
            "target_directories:\n  library:\n    - path: {}\n      category: Personal\n\
             settings:\n  workers: 1\n  extraction_timeout_secs: 0\n",
            library.display()
        ),
    )
    .unwrap();
    let db = temp_dir.path().join("catalog.db");

    let mut child = Command::new(env!("CARGO_BIN_EXE_photo-catalog"))
        .arg("scan")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(60);
    loop {
        assert!(
            child.try_wait().unwrap().is_none(),
            "scan ended before it could be interrupted"
        );
        if stored_files(&db).unwrap_or(0) > 100 {
            break;
        }
        assert!(Instant::now() < deadline, "scan never started writing");
        thread::sleep(Duration::from_millis(20));
    }

    let killed = Command::new("kill")
        .arg("-INT")
        .arg(child.id().to_string())
        .status()
        .unwrap();
    assert!(killed.success());

    let status = child.wait().unwrap();
    assert!(!status.success());
    // Finalized by the handler, not killed by the signal
    assert!(status.code().is_some());

    let conn = Connection::open(&db).unwrap();
    let (state, cause, ended_at, counts): (String, Option<String>, Option<String>, String) = conn
        .query_row(
            "SELECT status, failure_cause, ended_at, counts FROM scan_sessions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();

    assert_eq!(state, "failed");
    assert_eq!(cause.as_deref(), Some("interrupted"));
    assert!(ended_at.is_some());

    let counts: serde_json::Value = serde_json::from_str(&counts).unwrap();
    let processed = counts["files_processed"].as_i64().unwrap();
    let stored = stored_files(&db).unwrap();
    assert!(processed > 0 && processed < 30_000);
    assert_eq!(processed, stored);
}
