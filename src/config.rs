//! Application configuration, loaded once at boot from the environment.
//!
//! Mirrors the teacher's `SlyConfig::load()` pattern (env + `.env` via
//! `dotenvy`) but validates eagerly: a missing required variable fails boot
//! instead of silently defaulting, since this service has no interactive
//! operator to notice a silently-misconfigured deployment.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_service_key: String,
    pub broker_bootstrap_servers: String,
    pub broker_topics_path: String,

    pub llm_api_base: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_max_retries: u32,

    pub worker_count: usize,
    pub virtual_staleness_days: f64,
    pub problem_generation_timeout_ms: u64,
    pub prompt_version: String,
    pub request_expiry_minutes: i64,

    pub http_port: u16,
    pub telemetry_endpoint: Option<String>,
}

impl AppConfig {
    /// Loads configuration from the process environment, having first tried
    /// to populate it from a local `.env` file (no-op if absent).
    pub fn load() -> Result<Self, crate::AppError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: require_env("DATABASE_URL")?,
            database_service_key: require_env("DATABASE_SERVICE_KEY")?,
            broker_bootstrap_servers: require_env("BROKER_BOOTSTRAP_SERVERS")?,
            broker_topics_path: env_or("BROKER_TOPICS_PATH", "topics.yaml"),

            llm_api_base: env_or("LLM_API_BASE", "https://api.openai.com/v1"),
            llm_api_key: require_env("LLM_API_KEY")?,
            llm_model: env_or("LLM_MODEL", "gpt-4o-mini"),
            llm_max_retries: env_parse("LLM_MAX_RETRIES", 3)?,

            worker_count: env_parse("WORKER_COUNT", 2)?,
            virtual_staleness_days: env_parse("VIRTUAL_STALENESS_DAYS", 3.0)?,
            problem_generation_timeout_ms: env_parse("PROBLEM_GENERATION_TIMEOUT_MS", 60_000)?,
            prompt_version: env_or("PROMPT_VERSION", "2.0"),
            request_expiry_minutes: env_parse("REQUEST_EXPIRY_MINUTES", 30)?,

            http_port: env_parse("HTTP_PORT", 8080)?,
            telemetry_endpoint: env::var("TELEMETRY_ENDPOINT").ok(),
        })
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.problem_generation_timeout_ms)
    }

    pub fn virtual_staleness_seconds(&self) -> f64 {
        self.virtual_staleness_days * 86_400.0
    }

    pub fn request_expiry(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.request_expiry_minutes)
    }
}

fn require_env(key: &str) -> Result<String, crate::AppError> {
    env::var(key).map_err(|_| {
        crate::AppError::Internal(format!("missing required environment variable {key}"))
    })
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T, crate::AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| crate::AppError::Internal(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_required_var_fails_fast() {
        let _guard = ENV_LOCK.lock().unwrap();
        for key in [
            "DATABASE_URL",
            "DATABASE_SERVICE_KEY",
            "BROKER_BOOTSTRAP_SERVERS",
            "LLM_API_KEY",
        ] {
            env::remove_var(key);
        }
        assert!(AppConfig::load().is_err());
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("DATABASE_URL", "postgres://localhost/quizforge");
        env::set_var("DATABASE_SERVICE_KEY", "service-key");
        env::set_var("BROKER_BOOTSTRAP_SERVERS", "localhost:9092");
        env::set_var("LLM_API_KEY", "sk-test");
        env::remove_var("WORKER_COUNT");

        let config = AppConfig::load().unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.prompt_version, "2.0");

        for key in [
            "DATABASE_URL",
            "DATABASE_SERVICE_KEY",
            "BROKER_BOOTSTRAP_SERVERS",
            "LLM_API_KEY",
        ] {
            env::remove_var(key);
        }
    }
}
