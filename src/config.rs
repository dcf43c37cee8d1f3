use anyhow::{anyhow, Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::payments::providers::garanti::GarantiConfig;
use crate::payments::providers::paytr::PaytrConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub garanti: GarantiConfig,
    pub paytr: PaytrConfig,
    pub redirects: RedirectConfig,
    pub logging: LoggingConfig,
    /// Age after which pending transactions are expired; `None` disables the sweep
    pub pending_ttl: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

/// Storefront pages the bank callback redirects the browser to
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    pub success_url: String,
    pub fail_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// Provider environment selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Test,
    Prod,
}

impl GatewayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayMode::Test => "TEST",
            GatewayMode::Prod => "PROD",
        }
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TEST" => Ok(GatewayMode::Test),
            "PROD" => Ok(GatewayMode::Prod),
            other => Err(anyhow!("mode must be 'TEST' or 'PROD', got {}", other)),
        }
    }
}

impl RedirectConfig {
    pub fn from_env() -> Self {
        Self {
            success_url: env::var("FRONTEND_SUCCESS_URL")
                .unwrap_or_else(|_| "http://localhost:5173/payment/success".to_string()),
            fail_url: env::var("FRONTEND_FAIL_URL")
                .unwrap_or_else(|_| "http://localhost:5173/payment/fail".to_string()),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
            run_migrations: env::var("RUN_MIGRATIONS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        let logging = LoggingConfig {
            format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let pending_ttl = parse_pending_ttl(env::var("PAYMENT_PENDING_TTL_MINUTES").ok())?;

        let config = Config {
            server,
            database,
            garanti: GarantiConfig::from_env().context("Garanti configuration")?,
            paytr: PaytrConfig::from_env().context("PayTR configuration")?,
            redirects: RedirectConfig::from_env(),
            logging,
            pending_ttl,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.redirects.success_url.trim().is_empty() || self.redirects.fail_url.trim().is_empty()
        {
            return Err(anyhow!(
                "FRONTEND_SUCCESS_URL and FRONTEND_FAIL_URL cannot be empty"
            ));
        }

        if self.garanti.callback_url.trim().is_empty() {
            return Err(anyhow!("PAYMENT_CALLBACK_URL cannot be empty"));
        }

        if self.server.environment == "production"
            && (self.garanti.mode != GatewayMode::Prod || self.paytr.mode != GatewayMode::Prod)
        {
            return Err(anyhow!("production environment requires PROD gateway modes"));
        }

        if self.pending_ttl == Some(Duration::ZERO) {
            return Err(anyhow!("PAYMENT_PENDING_TTL_MINUTES must be greater than 0"));
        }

        Ok(())
    }
}

/// Minutes from `PAYMENT_PENDING_TTL_MINUTES`; unset means never expire
fn parse_pending_ttl(minutes: Option<String>) -> Result<Option<Duration>> {
    let Some(minutes) = minutes else {
        return Ok(None);
    };
    let seconds = minutes
        .trim()
        .parse::<u64>()
        .context("PAYMENT_PENDING_TTL_MINUTES must be a valid number")?
        .checked_mul(60)
        .ok_or_else(|| anyhow!("PAYMENT_PENDING_TTL_MINUTES is too large"))?;
    Ok(Some(Duration::from_secs(seconds)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_mode_parsing() {
        assert_eq!("TEST".parse::<GatewayMode>().unwrap(), GatewayMode::Test);
        assert_eq!("prod".parse::<GatewayMode>().unwrap(), GatewayMode::Prod);
        assert!("LIVE".parse::<GatewayMode>().is_err());
    }

    #[test]
    fn test_gateway_mode_display() {
        assert_eq!(GatewayMode::Prod.to_string(), "PROD");
    }

    #[test]
    fn test_pending_ttl_parsing() {
        assert_eq!(parse_pending_ttl(None).unwrap(), None);
        assert_eq!(
            parse_pending_ttl(Some("30".to_string())).unwrap(),
            Some(Duration::from_secs(1800))
        );
        assert!(parse_pending_ttl(Some("soon".to_string())).is_err());
    }

    #[test]
    fn test_pending_ttl_overflow_is_rejected() {
        let error = parse_pending_ttl(Some(u64::MAX.to_string())).unwrap_err();
        assert!(error.to_string().contains("too large"));
    }
}
