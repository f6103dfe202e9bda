//! End-to-end SQLite probes against real database files

#[cfg(feature = "sqlite")]
mod sqlite_probe_tests {
    use rusqlite::{Connection, OpenFlags};
    use sqlprobe_backends::{SqlProbeBuilderExt, SqliteConnection};
    use sqlprobe_core::{
        CancellationToken, HealthChecks, HealthChecksBuilder, HealthStatus, ProbeError,
        SqlProbeOptions,
    };
    use std::path::Path;
    use std::time::Duration;

    fn seeded_database(dir: &Path) -> String {
        let path = dir.join("app.db");
        let connection = Connection::open(&path).unwrap();
        connection
            .execute_batch("CREATE TABLE accounts (id INTEGER PRIMARY KEY); INSERT INTO accounts VALUES (7);")
            .unwrap();
        path.to_string_lossy().into_owned()
    }

    fn single(builder: HealthChecksBuilder) -> HealthChecks {
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_existing_database_is_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_database(dir.path());

        let mut builder = HealthChecks::builder();
        builder.add_sqlite(path, SqlProbeOptions::new());
        let checks = single(builder);

        let result = checks.registrations()[0]
            .run(&CancellationToken::new())
            .await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_custom_query_against_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_database(dir.path());

        let mut builder = HealthChecks::builder();
        builder
            .add_sqlite(
                path.clone(),
                SqlProbeOptions::new()
                    .name("accounts")
                    .health_query("SELECT count(*) FROM accounts"),
            )
            .add_sqlite(
                path,
                SqlProbeOptions::new()
                    .name("missing-table")
                    .health_query("SELECT count(*) FROM invoices")
                    .failure_status(HealthStatus::Degraded),
            );
        let checks = single(builder);

        let report = checks.check_all(&CancellationToken::new()).await;
        assert_eq!(report.entries["accounts"].status, HealthStatus::Healthy);

        let missing = &report.entries["missing-table"];
        assert_eq!(missing.status, HealthStatus::Degraded);
        assert!(
            missing
                .error
                .as_deref()
                .is_some_and(|e| e.contains("no such table: invoices"))
        );
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");

        let mut builder = HealthChecks::builder();
        builder.add_sqlite(path.to_string_lossy(), SqlProbeOptions::new());
        let checks = single(builder);

        let result = checks.registrations()[0]
            .run(&CancellationToken::new())
            .await;

        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(matches!(result.error, Some(ProbeError::Open { .. })));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_before_open_can_relax_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.db");

        let mut builder = HealthChecks::builder();
        builder.add_sqlite(
            path.to_string_lossy(),
            SqlProbeOptions::new().before_open(|connection: &mut SqliteConnection| {
                connection.set_flags(connection.flags() | OpenFlags::SQLITE_OPEN_CREATE);
                connection.set_busy_timeout(Duration::from_millis(100));
            }),
        );
        let checks = single(builder);

        let result = checks.registrations()[0]
            .run(&CancellationToken::new())
            .await;

        assert_eq!(result.status, HealthStatus::Healthy);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_connection_factory_with_open_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_database(dir.path());

        let mut builder = HealthChecks::builder();
        builder.add_sqlite_connection(
            move |_cancel| {
                let opened = Connection::open(&path)
                    .map(SqliteConnection::from_connection)
                    .map_err(|e| ProbeError::connection_factory(e.to_string()));
                async move { opened.map(Some) }
            },
            SqlProbeOptions::new().configure_command(|command| {
                command.set_text("SELECT id FROM accounts");
                command.set_timeout(Duration::from_secs(1));
            }),
        );
        let checks = single(builder);

        let report = checks.check_all(&CancellationToken::new()).await;
        assert_eq!(report.entries["sqlite"].status, HealthStatus::Healthy);
    }

    #[test]
    fn test_timed_out_check_stops_running_query() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .max_blocking_threads(1)
            .build()
            .unwrap();

        runtime.block_on(async {
            let mut builder = HealthChecks::builder();
            builder.add_sqlite(
                ":memory:",
                SqlProbeOptions::new()
                    .health_query(
                        "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n \
                         WHERE x < 500000000) SELECT count(*) FROM n",
                    )
                    .timeout(Duration::from_millis(50)),
            );
            let checks = single(builder);

            let result = checks.registrations()[0]
                .run(&CancellationToken::new())
                .await;
            assert!(matches!(result.error, Some(ProbeError::TimedOut { .. })));

            let freed =
                tokio::time::timeout(Duration::from_secs(2), tokio::task::spawn_blocking(|| ()))
                    .await;
            assert!(freed.is_ok(), "query kept running after the check timed out");
        });
    }

    #[tokio::test]
    async fn test_null_connection_from_factory() {
        let mut builder = HealthChecks::builder();
        builder.add_sqlite_connection(|_cancel| async { Ok(None) }, SqlProbeOptions::new());
        let checks = single(builder);

        let result = checks.registrations()[0]
            .run(&CancellationToken::new())
            .await;

        assert_eq!(result.error, Some(ProbeError::NullConnection));
    }
}
