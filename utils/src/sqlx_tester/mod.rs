use std::{path::Path, thread};

use sqlx::PgPool;
use tokio::runtime::Runtime;
use tracing::{debug, error};

use abi::config::PostgresConfig;

/// A throwaway database: created with migrations applied on construction,
/// dropped together with its connections when the value goes out of scope.
pub struct TestDb {
    config: PostgresConfig,
}

impl TestDb {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        migrations: impl Into<String>,
    ) -> TestDb {
        let config = PostgresConfig {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: String::new(),
            max_connections: 5,
        };
        Self::from_config(&config, migrations)
    }

    /// reuse server and credentials of `config`, the database name is generated
    pub fn from_config(config: &PostgresConfig, migrations: impl Into<String>) -> TestDb {
        let mut config = config.clone();
        config.database = format!("test_{}", uuid::Uuid::new_v4().simple());
        let server_url = config.server_url();
        let url = config.url();
        let dbname = config.database.clone();
        let migrations = migrations.into();

        // the caller may already be inside a runtime
        thread::spawn(move || {
            Runtime::new().unwrap().block_on(async move {
                let conn = PgPool::connect(&server_url).await.unwrap();
                sqlx::query(&format!(r#"CREATE DATABASE "{}""#, dbname))
                    .execute(&conn)
                    .await
                    .unwrap();

                let conn = PgPool::connect(&url).await.unwrap();
                sqlx::migrate::Migrator::new(Path::new(&migrations))
                    .await
                    .unwrap()
                    .run(&conn)
                    .await
                    .unwrap();
                debug!("test database {} ready", dbname);
            });
        })
        .join()
        .unwrap();

        TestDb { config }
    }

    pub fn url(&self) -> String {
        self.config.url()
    }

    pub async fn pool(&self) -> PgPool {
        PgPool::connect(&self.url()).await.unwrap()
    }

    pub fn dbname(&self) -> &str {
        &self.config.database
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let server_url = self.config.server_url();
        let dbname = self.config.database.clone();
        let result = thread::spawn(move || {
            Runtime::new().unwrap().block_on(async move {
                let conn = PgPool::connect(&server_url).await?;
                sqlx::query(&format!(
                    r#"SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{dbname}' AND pid <> pg_backend_pid()"#
                ))
                .execute(&conn)
                .await?;
                sqlx::query(&format!(r#"DROP DATABASE "{dbname}""#))
                    .execute(&conn)
                    .await?;
                Ok::<_, sqlx::Error>(())
            })
        })
        .join();
        match result {
            Ok(Err(e)) => error!("drop test database failed: {}", e),
            Err(_) => error!("drop test database panicked"),
            Ok(Ok(())) => {}
        }
    }
}
