use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub worker: WorkerConfig,
    pub practice: PracticeEnvConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_cache_cleanup: bool,
    pub enable_profile_warmup: bool,
}

/// Environment overrides applied on top of the algorithm defaults.
/// A persisted config version, when present, takes precedence.
#[derive(Debug, Clone)]
pub struct PracticeEnvConfig {
    pub cache_enabled: bool,
    pub mixing_enabled: bool,
    pub target_retention: f64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/practice.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_cache_cleanup: env_or_bool("ENABLE_CACHE_CLEANUP_WORKER", true),
                enable_profile_warmup: env_or_bool("ENABLE_PROFILE_WARMUP_WORKER", true),
            },
            practice: PracticeEnvConfig {
                cache_enabled: env_or_bool("PRACTICE_CACHE_ENABLED", true),
                mixing_enabled: env_or_bool("PRACTICE_MIXING_ENABLED", true),
                target_retention: env_or_parse("PRACTICE_TARGET_RETENTION", 0.9_f64),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "HOST",
            "PORT",
            "RUST_LOG",
            "WORKER_LEADER",
            "ENABLE_CACHE_CLEANUP_WORKER",
            "ENABLE_PROFILE_WARMUP_WORKER",
            "PRACTICE_CACHE_ENABLED",
            "PRACTICE_MIXING_ENABLED",
            "PRACTICE_TARGET_RETENTION",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.worker.is_leader);
        assert!(cfg.practice.cache_enabled);
        assert_eq!(cfg.practice.target_retention, 0.9);
    }

    #[test]
    fn parses_numeric_values() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "4000");
        env::set_var("PRACTICE_TARGET_RETENTION", "0.85");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.practice.target_retention, 0.85);
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "bad");
        env::set_var("PRACTICE_TARGET_RETENTION", "high");
        env::set_var("PRACTICE_CACHE_ENABLED", "maybe");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.practice.target_retention, 0.9);
        assert!(cfg.practice.cache_enabled);
    }

    #[test]
    fn feature_flags_isolation() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PRACTICE_MIXING_ENABLED", "off");
        env::set_var("WORKER_LEADER", "false");
        env::set_var("ENABLE_PROFILE_WARMUP_WORKER", "0");

        let cfg = Config::from_env();
        assert!(!cfg.practice.mixing_enabled);
        assert!(cfg.practice.cache_enabled);
        assert!(!cfg.worker.is_leader);
        assert!(cfg.worker.enable_cache_cleanup);
        assert!(!cfg.worker.enable_profile_warmup);
    }
}
