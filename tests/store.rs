use tempus::{close, global, open, DatabaseConfig, TempusConfig, TempusError};

// The default-store lifecycle is process-global; everything is exercised
// in one test to keep it race-free.
#[tokio::test]
async fn default_store_lifecycle() {
    assert!(matches!(global(), Err(TempusError::NotOpen)));

    let dir = tempfile::tempdir().expect("tempdir");
    let config = TempusConfig::default_sqlite(dir.path().join("tempus.sqlite").to_string_lossy());

    let store = open(&config, dir.path()).await.expect("open");
    assert_eq!(store.now_keyword(), "now");

    let err = open(&config, dir.path()).await.expect_err("second open");
    assert!(matches!(err, TempusError::AlreadyOpen));

    let fallback = global().expect("global");
    assert_eq!(fallback.backend(), store.backend());

    close().await.expect("close");
    assert!(matches!(global(), Err(TempusError::NotOpen)));
    close().await.expect("close is idempotent");
}

#[test]
fn config_load_or_init_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let default_path = dir.path().join("data.sqlite");

    let config = TempusConfig::load_or_init(dir.path(), &default_path).expect("init");
    assert_eq!(config.backend_name(), "sqlite");
    assert!(dir.path().join("tempus.json").exists());

    // a second load reads the file written by the first
    let reloaded = TempusConfig::load_or_init(dir.path(), &default_path).expect("reload");
    assert_eq!(reloaded.backend_name(), "sqlite");
    assert_eq!(
        reloaded.sqlite_path(dir.path()).expect("sqlite path"),
        default_path
    );
}

#[test]
fn config_connection_urls() {
    let pg = TempusConfig {
        database: DatabaseConfig::Postgres {
            url: "postgres://user@localhost/testdb".to_string(),
        },
        pool: None,
    };
    assert_eq!(pg.backend_name(), "postgres");
    assert_eq!(
        pg.connection_url(),
        Some("postgres://user@localhost/testdb")
    );
    assert!(pg.sqlite_path(std::path::Path::new(".")).is_err());

    let sqlite = TempusConfig::default_sqlite("db.sqlite");
    assert_eq!(sqlite.connection_url(), None);
}
