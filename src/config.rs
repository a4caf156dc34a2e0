use anyhow::Context;
use std::str::FromStr;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug)]
pub struct Config {
    database_url: String,
    max_connections: u32,
    server_port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = load_env("DATABASE_URL")?;
        let max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw
                .parse()
                .context("Failed to parse environment variable DATABASE_MAX_CONNECTIONS")?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };
        let server_port = load_env("SERVER_PORT")?;
        Ok(Self {
            database_url,
            max_connections,
            server_port,
        })
    }

    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    #[must_use]
    pub const fn max_connections(&self) -> u32 {
        self.max_connections
    }

    #[must_use]
    pub const fn server_port(&self) -> u16 {
        self.server_port
    }
}

fn load_env<T>(key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
{
    let val =
        std::env::var(key).with_context(|| format!("Failed to load environment variable {key}"))?;
    val.parse::<T>()
        .with_context(|| format!("Failed to parse environment variable {key}"))
}
