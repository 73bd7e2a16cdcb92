//! Explicit proxy settings for image requests.

use std::fmt;
use std::str::FromStr;

use reqwest::Proxy;

use crate::fetch::FetchError;

/// Which request schemes go through the proxy
#[derive(Debug, Clone, PartialEq, Eq, Copy, Default)]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    /// SOCKS5 for every scheme; a bare `host:port` gets the `socks5://` scheme
    Socks5,
    All,
}

impl FromStr for ProxyType {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "socks5" | "socks" => Ok(Self::Socks5),
            "all" => Ok(Self::All),
            other => Err(FetchError::Proxy(format!(
                "unknown proxy type '{other}', expected http, https, socks5 or all"
            ))),
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks5 => "socks5",
            Self::All => "all",
        })
    }
}

/// Basic credentials sent to the proxy
#[derive(Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>, proxy_type: ProxyType) -> Self {
        Self {
            url: url.into(),
            proxy_type,
            auth: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(ProxyAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// URL handed to reqwest, with the SOCKS scheme filled in when missing
    fn target_url(&self) -> String {
        match self.proxy_type {
            ProxyType::Socks5 if !self.url.contains("://") => format!("socks5://{}", self.url),
            _ => self.url.clone(),
        }
    }

    /// Build the reqwest proxy for this configuration
    pub fn to_proxy(&self) -> Result<Proxy, FetchError> {
        let url = self.target_url();
        let proxy = match self.proxy_type {
            ProxyType::Http => Proxy::http(&url),
            ProxyType::Https => Proxy::https(&url),
            ProxyType::Socks5 | ProxyType::All => Proxy::all(&url),
        }
        .map_err(|e| FetchError::Proxy(format!("invalid {} proxy '{}': {e}", self.proxy_type, self.url)))?;

        Ok(match &self.auth {
            Some(auth) => proxy.basic_auth(&auth.username, &auth.password),
            None => proxy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks5_scheme_is_added() {
        let config = ProxyConfig::new("127.0.0.1:1080", ProxyType::Socks5);
        assert_eq!(config.target_url(), "socks5://127.0.0.1:1080");
        assert!(config.to_proxy().is_ok());

        let explicit = ProxyConfig::new("socks5h://127.0.0.1:1080", ProxyType::Socks5);
        assert_eq!(explicit.target_url(), "socks5h://127.0.0.1:1080");
    }

    #[test]
    fn test_invalid_proxy_url_is_rejected() {
        let config = ProxyConfig::new("http://[::1", ProxyType::Http).with_auth("user", "pass");
        let err = config.to_proxy().unwrap_err();
        assert!(matches!(err, FetchError::Proxy(msg) if msg.starts_with("invalid http proxy")));
    }

    #[test]
    fn test_proxy_type_from_str() {
        assert_eq!("SOCKS5".parse::<ProxyType>().unwrap(), ProxyType::Socks5);
        assert_eq!("all".parse::<ProxyType>().unwrap(), ProxyType::All);
        assert!("ftp".parse::<ProxyType>().is_err());
    }

    #[test]
    fn test_auth_is_redacted_in_debug() {
        let config = ProxyConfig::new("http://proxy:8080", ProxyType::Http).with_auth("me", "hunter2");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("me"));
        assert!(!rendered.contains("hunter2"));
    }
}
