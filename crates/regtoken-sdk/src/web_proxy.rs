use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// A single `no_proxy` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByPassInfo {
    pub host: String,
    pub port: Option<String>,
}

/// Proxy routing read from `http_proxy` / `HTTP_PROXY`, `https_proxy` / `HTTPS_PROXY`,
/// and `no_proxy` / `NO_PROXY`.
///
/// Proxy addresses keep any `user:password@` part so that the HTTP client can
/// authenticate against the proxy. Use [`WebProxy::describe`] for log output.
#[derive(Debug, Clone, Default)]
pub struct WebProxy {
    pub http_proxy_address: Option<Url>,
    pub https_proxy_address: Option<Url>,
    pub no_proxy_list: Vec<ByPassInfo>,
}

/// Regex to validate an IPv4 address.
static VALID_IP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])\.){3}([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])$",
    )
    .expect("Invalid IP regex")
});

impl WebProxy {
    /// Build the proxy configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_values(
            read_env_ci("http_proxy", "HTTP_PROXY").as_deref(),
            read_env_ci("https_proxy", "HTTPS_PROXY").as_deref(),
            read_env_ci("no_proxy", "NO_PROXY").as_deref(),
        )
    }

    /// Build the proxy configuration from raw values.
    ///
    /// Unparseable proxy addresses are ignored. Addresses without a scheme get `http://`.
    pub fn from_values(http: Option<&str>, https: Option<&str>, no_proxy: Option<&str>) -> Self {
        let mut proxy = WebProxy {
            http_proxy_address: http.and_then(parse_proxy_address),
            https_proxy_address: https.and_then(parse_proxy_address),
            no_proxy_list: Vec::new(),
        };

        if proxy.http_proxy_address.is_none() && proxy.https_proxy_address.is_none() {
            return proxy;
        }

        if let Some(no_proxy) = no_proxy {
            let mut seen = std::collections::HashSet::new();
            for entry in no_proxy.split(',') {
                let trimmed = entry.trim();
                if trimmed.is_empty() {
                    continue;
                }

                if !seen.insert(trimmed.to_lowercase()) {
                    continue;
                }

                let parts: Vec<&str> = trimmed.splitn(2, ':').collect();
                let host = parts[0].to_string();
                let port = parts.get(1).map(|p| p.to_string());

                // IP-based bypass entries are not supported
                if VALID_IP_REGEX.is_match(&host) {
                    continue;
                }

                proxy.no_proxy_list.push(ByPassInfo { host, port });
            }
        }

        proxy
    }

    /// Whether any proxy is configured at all.
    pub fn is_configured(&self) -> bool {
        self.http_proxy_address.is_some() || self.https_proxy_address.is_some()
    }

    /// Determine the proxy URL to use for the given destination.
    /// Returns `None` if the destination should bypass the proxy.
    pub fn get_proxy_url(&self, destination: &Url) -> Option<Url> {
        if self.is_bypass(destination) {
            return None;
        }

        if destination.scheme() == "https" {
            self.https_proxy_address.clone()
        } else {
            self.http_proxy_address.clone()
        }
    }

    /// Check if the given destination URL should bypass the proxy.
    pub fn is_bypass(&self, destination: &Url) -> bool {
        match destination.scheme() {
            "https" if self.https_proxy_address.is_none() => return true,
            "http" if self.http_proxy_address.is_none() => return true,
            _ => {}
        }

        // Loopback is always bypassed
        if let Some(host) = destination.host_str() {
            let host_lower = host.to_lowercase();
            if host_lower == "localhost"
                || host_lower == "127.0.0.1"
                || host_lower == "::1"
                || host_lower == "[::1]"
            {
                return true;
            }
        }

        self.is_uri_in_bypass_list(destination)
    }

    /// Proxy addresses with credentials stripped, for logging.
    pub fn describe(&self) -> String {
        let strip = |url: &Option<Url>| match url {
            Some(u) => {
                let mut u = u.clone();
                let _ = u.set_username("");
                let _ = u.set_password(None);
                u.to_string()
            }
            None => "-".to_string(),
        };
        format!(
            "http={} https={} no_proxy={}",
            strip(&self.http_proxy_address),
            strip(&self.https_proxy_address),
            self.no_proxy_list.len()
        )
    }

    fn is_uri_in_bypass_list(&self, destination: &Url) -> bool {
        let dest_host = match destination.host_str() {
            Some(h) => h.to_lowercase(),
            None => return false,
        };
        let dest_port = destination.port_or_known_default().map(|p| p.to_string());

        for bypass in &self.no_proxy_list {
            if bypass.host == "*" {
                return true;
            }

            let port_match = match (&bypass.port, &dest_port) {
                (None, _) => true,
                (Some(bp), Some(dp)) => bp == dp,
                (Some(_), None) => false,
            };

            let bypass_host = bypass.host.to_lowercase();
            let host_match = if bypass_host.starts_with('.') {
                dest_host.ends_with(&bypass_host)
            } else {
                dest_host == bypass_host || dest_host.ends_with(&format!(".{bypass_host}"))
            };

            if host_match && port_match {
                return true;
            }
        }

        false
    }
}

/// Read an environment variable, trying the lowercase name first, then uppercase.
fn read_env_ci(lower: &str, upper: &str) -> Option<String> {
    std::env::var(lower)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(upper).ok().filter(|s| !s.trim().is_empty()))
}

/// Parse a proxy address, prepending `http://` when no scheme is present.
fn parse_proxy_address(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let address = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    Url::parse(&address).ok()
}

/// Decode percent-encoded proxy user info, e.g. `p%40ss` -> `p@ss`.
pub fn decode_user_info(url: &Url) -> (Option<String>, Option<String>) {
    let username = if url.username().is_empty() {
        None
    } else {
        Some(
            percent_encoding::percent_decode_str(url.username())
                .decode_utf8_lossy()
                .to_string(),
        )
    };

    let password = url.password().map(|p| {
        percent_encoding::percent_decode_str(p)
            .decode_utf8_lossy()
            .to_string()
    });

    (username, password)
}
