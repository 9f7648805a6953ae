// src/http.rs
// reqwest client construction for the model providers

use std::time::Duration;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub const USER_AGENT: &str = concat!("healthy/", env!("CARGO_PKG_VERSION"));

/// Build a pooled client with the given request timeout.
///
/// One per provider: report calls at high effort need a much longer
/// timeout than chat turns on the fallback.
pub fn create_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .pool_max_idle_per_host(4)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_version() {
        assert!(USER_AGENT.starts_with("healthy/"));
        assert!(USER_AGENT.len() > "healthy/".len());
    }

    #[test]
    fn test_short_timeout_client_builds() {
        let _client = create_client(Duration::from_secs(5));
    }
}
