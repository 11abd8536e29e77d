//! Tiberius connection management over a bb8 pool.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{info, warn};

use crate::config::EndpointConfig;
use crate::error::{ReconcileError, Result};

/// Connection pool timeouts.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// A pooled tiberius client.
pub type MssqlConnection<'a> = PooledConnection<'a, TiberiusConnectionManager>;

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: EndpointConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: EndpointConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if let Some(app) = &self.config.app_name {
            config.application_name(app);
        }

        if self.config.trust_server_cert {
            config.trust_cert();
        }
        if self.config.encrypt {
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;

        tcp.set_nodelay(true).ok();

        // Keep pooled connections alive between windows
        let socket = socket2::SockRef::from(&tcp);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(TCP_KEEPALIVE_INTERVAL)
            .with_interval(TCP_KEEPALIVE_INTERVAL);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
        }

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Connection pool for one side.
pub struct MssqlPool {
    pool: Pool<TiberiusConnectionManager>,
    name: String,
}

impl MssqlPool {
    /// Create a pool and verify that a connection can be opened.
    pub async fn new(config: &EndpointConfig, max_conns: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_conns)
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .max_lifetime(Some(POOL_MAX_LIFETIME))
            .build(manager)
            .await
            .map_err(|e| ReconcileError::pool(e, "creating MSSQL pool"))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| ReconcileError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!("Connected to MSSQL: {}", config.display_name());

        Ok(Self {
            pool,
            name: config.display_name(),
        })
    }

    /// Get a connection from the pool.
    pub async fn get_conn(&self) -> Result<MssqlConnection<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| ReconcileError::pool(e, format!("getting connection to {}", self.name)))
    }

    /// `host:port/database` of the pooled database.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Round-trip a trivial query and return its latency.
    pub async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        let mut conn = self.get_conn().await?;
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(start.elapsed())
    }
}
