/// 환경 변수 기반 설정
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// 프로세스 내부 저장소
    Memory,
    /// Postgres + Kafka 변경 피드
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: String,
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub kafka_brokers: String,
    pub change_topic: String,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("알 수 없는 저장소 종류: {0}")]
    UnknownBackend(String),
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} 값이 올바르지 않습니다: {value}")]
    InvalidNumber { var: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 변수 조회 함수를 받아 설정 생성
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("postgres") => StoreBackend::Postgres,
            Some(other) => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        let database_url = lookup("DATABASE_URL");
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let database_max_connections: u32 =
            parse_positive(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?;
        let sweep_interval_ms: u64 = parse_positive(&lookup, "AUCTION_SWEEP_INTERVAL_MS", 1000)?;

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            backend,
            database_url,
            database_max_connections,
            kafka_brokers: lookup("KAFKA_BROKERS").unwrap_or_else(|| "localhost:9092".to_string()),
            change_topic: lookup("CHANGE_TOPIC").unwrap_or_else(|| "document-changes".to_string()),
            sweep_interval: Duration::from_millis(sweep_interval_ms),
        })
    }
}

/// 0보다 큰 정수 변수 파싱 (없으면 기본값)
fn parse_positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(value) = lookup(var) else {
        return Ok(default);
    };
    let parsed = value.trim().parse::<T>();
    match parsed {
        Ok(number) if number > T::default() => Ok(number),
        _ => Err(ConfigError::InvalidNumber { var, value }),
    }
}
