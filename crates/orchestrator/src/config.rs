use std::str::FromStr;
use std::time::Duration;

/// Orchestrator configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-request timeout for worker HTTP calls (default: 2500 ms).
    pub worker_request_timeout: Duration,
    /// Delay between queue polls while waiting for capacity (default: 500 ms).
    pub capacity_poll_interval: Duration,
    /// Give up waiting for capacity after this long (default: 600 s).
    pub capacity_wait_timeout: Duration,
    /// Delay between tracking polls (default: 250 ms).
    pub prompt_poll_interval: Duration,
    /// Tracking polls per prompt before giving up (default: 40).
    pub prompt_poll_max_attempts: u32,
    /// Period of the background health monitor (default: 30 s).
    pub health_check_interval: Duration,
    /// Pause between consecutive worker checks in one sweep (default: 100 ms).
    pub health_check_stagger: Duration,
    /// Minimum worker version accepted as healthy.
    pub worker_min_version: Option<String>,
    /// Feature tags every healthy worker must report.
    pub worker_required_features: Vec<String>,
    /// Background generation consumers (default: 2).
    pub generation_consumers: usize,
    /// Bounded generation queue depth (default: 64).
    pub generation_queue_capacity: usize,
    /// Worst-case prompts submitted by a pilot run (default: 10).
    pub pilot_sample_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_request_timeout: Duration::from_millis(2500),
            capacity_poll_interval: Duration::from_millis(500),
            capacity_wait_timeout: Duration::from_secs(600),
            prompt_poll_interval: Duration::from_millis(250),
            prompt_poll_max_attempts: 40,
            health_check_interval: Duration::from_secs(30),
            health_check_stagger: Duration::from_millis(100),
            worker_min_version: None,
            worker_required_features: Vec::new(),
            generation_consumers: 2,
            generation_queue_capacity: 64,
            pilot_sample_size: 10,
        }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    parse_or(name, std::env::var(name).ok(), default)
}

/// Parse `raw` as `T`, falling back to `default` when unset. Panics on a
/// value that does not fit `T`.
fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            panic!("{name} must be a valid {}", std::any::type_name::<T>())
        }),
        None => default,
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `WORKER_REQUEST_TIMEOUT_MS`  | `2500`  |
    /// | `CAPACITY_POLL_INTERVAL_MS`  | `500`   |
    /// | `CAPACITY_WAIT_TIMEOUT_SECS` | `600`   |
    /// | `PROMPT_POLL_INTERVAL_MS`    | `250`   |
    /// | `PROMPT_POLL_MAX_ATTEMPTS`   | `40`    |
    /// | `HEALTH_CHECK_INTERVAL_SECS` | `30`    |
    /// | `HEALTH_CHECK_STAGGER_MS`    | `100`   |
    /// | `WORKER_MIN_VERSION`         | unset   |
    /// | `WORKER_REQUIRED_FEATURES`   | empty   |
    /// | `GENERATION_CONSUMERS`       | `2`     |
    /// | `GENERATION_QUEUE_CAPACITY`  | `64`    |
    /// | `PILOT_SAMPLE_SIZE`          | `10`    |
    pub fn from_env() -> Self {
        let worker_min_version = std::env::var("WORKER_MIN_VERSION")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let worker_required_features: Vec<String> = std::env::var("WORKER_REQUIRED_FEATURES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            worker_request_timeout: Duration::from_millis(env_parse::<u64>("WORKER_REQUEST_TIMEOUT_MS", 2500)),
            capacity_poll_interval: Duration::from_millis(env_parse::<u64>("CAPACITY_POLL_INTERVAL_MS", 500)),
            capacity_wait_timeout: Duration::from_secs(env_parse::<u64>("CAPACITY_WAIT_TIMEOUT_SECS", 600)),
            prompt_poll_interval: Duration::from_millis(env_parse::<u64>("PROMPT_POLL_INTERVAL_MS", 250)),
            prompt_poll_max_attempts: env_parse::<u32>("PROMPT_POLL_MAX_ATTEMPTS", 40),
            health_check_interval: Duration::from_secs(env_parse::<u64>("HEALTH_CHECK_INTERVAL_SECS", 30)),
            health_check_stagger: Duration::from_millis(env_parse::<u64>("HEALTH_CHECK_STAGGER_MS", 100)),
            worker_min_version,
            worker_required_features,
            generation_consumers: env_parse::<usize>("GENERATION_CONSUMERS", 2).max(1),
            generation_queue_capacity: env_parse::<usize>("GENERATION_QUEUE_CAPACITY", 64).max(1),
            pilot_sample_size: env_parse::<usize>("PILOT_SAMPLE_SIZE", 10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_values_use_the_default() {
        assert_eq!(parse_or::<u32>("PROMPT_POLL_MAX_ATTEMPTS", None, 40), 40);
        assert_eq!(parse_or::<u32>("PROMPT_POLL_MAX_ATTEMPTS", Some(" 7 ".into()), 40), 7);
    }

    #[test]
    #[should_panic(expected = "PROMPT_POLL_MAX_ATTEMPTS must be a valid u32")]
    fn values_too_large_for_the_field_are_rejected() {
        parse_or::<u32>("PROMPT_POLL_MAX_ATTEMPTS", Some("4294967296".into()), 40);
    }
}
