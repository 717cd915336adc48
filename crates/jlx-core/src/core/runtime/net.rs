use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

use crate::JLX_VERSION;

const PROXY_KEYS: &[&str] = &[
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
    "NO_PROXY",
    "no_proxy",
];

/// Decide whether downloads should honor standard proxy environment variables.
///
/// - `JLX_KEEP_PROXIES=1/true/yes/on` forces proxies on.
/// - `JLX_KEEP_PROXIES=0/false/no/off/""` forces proxies off.
/// - If unset, proxies are enabled only when at least one proxy env var is set.
pub(crate) fn keep_proxies() -> bool {
    match env::var("JLX_KEEP_PROXIES") {
        Ok(raw) => {
            let value = raw.trim().to_ascii_lowercase();
            !matches!(value.as_str(), "" | "0" | "false" | "no" | "off")
        }
        Err(_) => PROXY_KEYS.iter().any(|key| {
            env::var(key)
                .ok()
                .is_some_and(|value| !value.trim().is_empty())
        }),
    }
}

pub(crate) fn build_http_client() -> Result<Client> {
    let builder = Client::builder()
        .user_agent(format!("jlx/{JLX_VERSION}"))
        .timeout(Duration::from_secs(600));
    let builder = if keep_proxies() {
        builder
    } else {
        builder.no_proxy()
    };
    builder.build().context("failed to build HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = env::var(key).ok();
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => env::set_var(self.key, value),
                None => env::remove_var(self.key),
            }
        }
    }

    fn clear_proxies() -> Vec<EnvGuard> {
        PROXY_KEYS
            .iter()
            .map(|key| EnvGuard::set(key, None))
            .collect()
    }

    #[test]
    #[serial]
    fn keep_proxies_follows_proxy_env_when_unset() {
        let _keep = EnvGuard::set("JLX_KEEP_PROXIES", None);
        let _cleared = clear_proxies();
        assert!(!keep_proxies());
        let _proxy = EnvGuard::set("HTTPS_PROXY", Some("http://proxy.example"));
        assert!(keep_proxies());
    }

    #[test]
    #[serial]
    fn keep_proxies_explicit_off_wins() {
        let _cleared = clear_proxies();
        let _proxy = EnvGuard::set("HTTP_PROXY", Some("http://proxy.example"));
        let _keep = EnvGuard::set("JLX_KEEP_PROXIES", Some("off"));
        assert!(!keep_proxies());
    }
}
