use crate::{Result, TestInfraError};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use typed_builder::TypedBuilder;

const CONNECT_ATTEMPTS: u32 = 20;
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);

#[derive(TypedBuilder)]
pub struct MysqlConfig {
    #[builder(default = "shortkey".to_string())]
    database: String,
    #[builder(default = "shortkey".to_string())]
    username: String,
    #[builder(default = "shortkey".to_string())]
    password: String,
    /// Statements run once the server accepts connections, e.g. DDL.
    #[builder(default)]
    init_sql: Vec<String>,
}

/// Test fixture for a disposable MySQL server.
pub struct MySqlServer {
    container: ContainerAsync<GenericImage>,
    config: MysqlConfig,
}

impl MySqlServer {
    /// Starts a MySQL container suitable for integration tests.
    pub async fn new(config: MysqlConfig) -> Result<Self> {
        let container = GenericImage::new("mysql", "8.4")
            .with_exposed_port(3306_u16.tcp())
            .with_wait_for(WaitFor::message_on_stderr("ready for connections"))
            .with_env_var("MYSQL_DATABASE", config.database.as_str())
            .with_env_var("MYSQL_USER", config.username.as_str())
            .with_env_var("MYSQL_PASSWORD", config.password.as_str())
            .with_env_var("MYSQL_ROOT_PASSWORD", "root")
            .start()
            .await?;

        Ok(Self { container, config })
    }

    pub async fn host(&self) -> Result<String> {
        Ok(self.container.get_host().await?.to_string())
    }

    pub async fn port(&self) -> Result<u16> {
        Ok(self.container.get_host_port_ipv4(3306).await?)
    }

    pub async fn database_url(&self) -> Result<String> {
        let host = self.host().await?;
        let port = self.port().await?;
        Ok(format!(
            "mysql://{}:{}@{}:{}/{}",
            self.config.username, self.config.password, host, port, self.config.database
        ))
    }

    /// Opens a pool, retrying while the server finishes booting, and runs
    /// the configured init statements.
    pub async fn pool(&self) -> Result<MySqlPool> {
        let url = self.database_url().await?;

        let mut last_error = None;
        let mut pool = None;
        for _ in 0..CONNECT_ATTEMPTS {
            match MySqlPoolOptions::new().max_connections(5).connect(&url).await {
                Ok(connected) => {
                    pool = Some(connected);
                    break;
                }
                Err(err) => {
                    last_error = Some(err);
                    tokio::time::sleep(CONNECT_BACKOFF).await;
                }
            }
        }

        let Some(pool) = pool else {
            return Err(TestInfraError::NotReady {
                attempts: CONNECT_ATTEMPTS,
                last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
            });
        };

        for statement in &self.config.init_sql {
            sqlx::raw_sql(statement).execute(&pool).await?;
        }

        Ok(pool)
    }

    /// Returns the underlying container reference.
    pub fn container(&self) -> &ContainerAsync<GenericImage> {
        &self.container
    }
}
