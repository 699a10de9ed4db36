//! End-to-end run against a live PostgreSQL database.
//!
//! Set `CHATSWEEP_TEST_POSTGRES_URL` to a throwaway database to enable; the
//! tests return early when it is unset. The chat, knowledge, memory, file and
//! document_chunk tables in that database are dropped and recreated.

use chatsweep_core::{sweep, RecordingObserver, SweepOptions, UploadsDir};
use chrono::{Duration, Utc};
use sqlx::{Connection, PgConnection};
use std::fs;
use tempfile::TempDir;
use tokio::runtime::Runtime;

const SCHEMA: &str = r#"
    DROP TABLE IF EXISTS chat, knowledge, memory, file, document_chunk;
    CREATE TABLE chat (
        id TEXT PRIMARY KEY,
        chat JSON,
        archived BOOLEAN NOT NULL DEFAULT FALSE,
        created_at BIGINT NOT NULL
    );
    CREATE TABLE knowledge (id TEXT PRIMARY KEY, data JSON);
    CREATE TABLE memory (id TEXT PRIMARY KEY, user_id TEXT);
    CREATE TABLE file (id TEXT PRIMARY KEY, path TEXT, meta JSON);
    CREATE TABLE document_chunk (id TEXT PRIMARY KEY, collection_name TEXT NOT NULL, text TEXT);
"#;

fn database_url() -> Option<String> {
    std::env::var("CHATSWEEP_TEST_POSTGRES_URL").ok()
}

fn seed(runtime: &Runtime, url: &str, uploads: &std::path::Path) {
    let now = Utc::now();
    let recent = (now - Duration::days(1)).timestamp();
    let stale = (now - Duration::days(400)).timestamp();
    let keep = uploads.join("f1_a.png");
    let gone = uploads.join("f3_c.txt");
    fs::write(&keep, b"a").unwrap();
    fs::write(&gone, b"c").unwrap();
    fs::write(uploads.join("stray.bin"), b"s").unwrap();

    let data = format!(
        r#"
        INSERT INTO chat VALUES
            ('recent', '{{"messages":[{{"files":[{{"file":{{"id":"f1"}}}}]}}]}}', FALSE, {recent}),
            ('stale', '{{"messages":[{{"file_id":"f3"}}]}}', FALSE, {stale});
        INSERT INTO knowledge VALUES ('k1', '{{"file_ids":["f2"]}}');
        INSERT INTO memory VALUES ('m1', '42');
        INSERT INTO file VALUES
            ('f1', '{keep}', '{{"collection_name":"file-f1"}}'),
            ('f2', '/elsewhere/f2_b.pdf', NULL),
            ('f3', '{gone}', '{{"collection_name":"file-f3"}}');
        INSERT INTO document_chunk VALUES
            ('v1', 'file-f1', 't'),
            ('v2', 'file-f3', 't'),
            ('v3', 'user-memory-42', 't'),
            ('v4', 'user-memory-7', 't');
        "#,
        keep = keep.display(),
        gone = gone.display(),
    );

    runtime.block_on(async {
        let mut conn = PgConnection::connect(url).await.unwrap();
        sqlx::raw_sql(SCHEMA).execute(&mut conn).await.unwrap();
        sqlx::raw_sql(&data).execute(&mut conn).await.unwrap();
        conn.close().await.unwrap();
    });
}

fn count(runtime: &Runtime, url: &str, sql: &str) -> i64 {
    runtime.block_on(async {
        let mut conn = PgConnection::connect(url).await.unwrap();
        let n = sqlx::query_scalar::<_, i64>(sql).fetch_one(&mut conn).await.unwrap();
        conn.close().await.unwrap();
        n
    })
}

// Both runs share the tables, so they stay in one test.
#[test]
fn test_postgres_dry_run_then_normal_run() {
    let Some(url) = database_url() else {
        return;
    };
    let runtime = Runtime::new().unwrap();
    let dir = TempDir::new().unwrap();
    seed(&runtime, &url, dir.path());

    let report = sweep(
        &url,
        &url,
        &UploadsDir::new(dir.path()),
        &SweepOptions::new(30).with_dry_run(true),
        &RecordingObserver::new(),
    )
    .unwrap();
    assert!(!report.committed);
    assert_eq!(report.files, 1);
    assert_eq!(count(&runtime, &url, "SELECT COUNT(*) FROM file"), 3);
    assert_eq!(count(&runtime, &url, "SELECT COUNT(*) FROM document_chunk"), 4);
    assert!(dir.path().join("stray.bin").exists());

    let report = sweep(
        &url,
        &url,
        &UploadsDir::new(dir.path()),
        &SweepOptions::new(30),
        &RecordingObserver::new(),
    )
    .unwrap();
    assert!(report.committed);
    assert_eq!((report.chats, report.files, report.chunks, report.uploads), (1, 1, 2, 2));
    assert_eq!(count(&runtime, &url, "SELECT COUNT(*) FROM chat"), 1);
    assert_eq!(count(&runtime, &url, "SELECT COUNT(*) FROM file"), 2);
    assert_eq!(count(&runtime, &url, "SELECT COUNT(*) FROM document_chunk"), 2);
    assert!(dir.path().join("f1_a.png").exists());
    assert!(!dir.path().join("stray.bin").exists());
}
