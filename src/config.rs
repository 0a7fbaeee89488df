use thiserror::Error;

pub const DEFAULT_LOG_FILTER: &str = "info,vitals=debug";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub port: u16,
    pub pool_size: u32,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub session_cookie: String,
}

impl Config {
    /// Reads the process environment after loading `.env`, if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
        let number = |key: &'static str, default: u32| match lookup(key) {
            None => Ok(default),
            Some(value) => value
                .parse::<u32>()
                .map_err(|_| ConfigError::Invalid { key, value }),
        };

        let port = number("PORT", 8080)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            key: "PORT",
            value: port.to_string(),
        })?;

        // r2d2 refuses an empty pool at build time.
        let pool_size = number("DB_POOL_SIZE", 10)?;
        if pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_POOL_SIZE",
                value: pool_size.to_string(),
            });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            pool_size,
            supabase_url: required("SUPABASE_URL")?,
            supabase_anon_key: required("SUPABASE_ANON_KEY")?,
            session_cookie: lookup("SESSION_COOKIE").unwrap_or_else(|| "sb-access-token".to_string()),
        })
    }
}
