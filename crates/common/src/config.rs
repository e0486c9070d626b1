use crate::error::{Error, Result};
use faststr::FastStr;
use std::{collections::HashSet, net::SocketAddr, path::PathBuf, time::Duration};

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_API_ADDR: &str = "0.0.0.0:19981";
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

/// One upstream-backed cache: `name` doubles as the backing file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSpec {
    pub name:         FastStr,
    pub url_template: FastStr,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir:         PathBuf,
    pub api_addr:         SocketAddr,
    pub shutdown_grace:   Duration,
    pub upstream_timeout: Duration,
    pub caches:           Vec<CacheSpec>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = lookup("DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_owned())
            .into();

        let api_addr = lookup("API_ADDR").unwrap_or_else(|| DEFAULT_API_ADDR.to_owned());
        let api_addr = api_addr
            .parse()
            .map_err(|_| Error::InvalidConfig("API_ADDR", api_addr.into()))?;

        let shutdown_grace =
            secs(&lookup, "SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE_SECS)?;
        let upstream_timeout =
            secs(&lookup, "UPSTREAM_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT_SECS)?;

        let caches = match lookup("CACHES") {
            Some(raw) => parse_caches(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            data_dir,
            api_addr,
            shutdown_grace,
            upstream_timeout,
            caches,
        })
    }
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<Duration> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| Error::InvalidConfig(name, raw.into())),
        None => Ok(Duration::from_secs(default)),
    }
}

/// Parses `name=template,name=template`. Empty segments are skipped.
pub fn parse_caches(raw: &str) -> Result<Vec<CacheSpec>> {
    let mut seen = HashSet::new();
    let mut specs = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, template) = part
            .split_once('=')
            .ok_or_else(|| Error::InvalidCacheSpec(part.to_owned().into()))?;
        let (name, template) = (name.trim(), template.trim());
        if name.is_empty() || template.is_empty() || name.contains(['/', '\\']) {
            return Err(Error::InvalidCacheSpec(part.to_owned().into()));
        }
        if !seen.insert(name) {
            return Err(Error::DuplicateCache(name.to_owned().into()));
        }
        specs.push(CacheSpec {
            name:         name.to_owned().into(),
            url_template: template.to_owned().into(),
        });
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.api_addr, "0.0.0.0:19981".parse().unwrap());
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
        assert!(config.caches.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATA_DIR", "/var/lib/zeroash"),
            ("API_ADDR", "127.0.0.1:8080"),
            ("SHUTDOWN_GRACE_SECS", "2"),
            (
                "CACHES",
                "mbid-covers=https://example.com/track?mbid={key}, video-covers=https://example.com/v/{key}",
            ),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/zeroash"));
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
        assert_eq!(config.caches.len(), 2);
        assert_eq!(config.caches[0].name.as_str(), "mbid-covers");
        assert_eq!(
            config.caches[1].url_template.as_str(),
            "https://example.com/v/{key}"
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("API_ADDR", "nowhere")])),
            Err(Error::InvalidConfig("API_ADDR", _))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("SHUTDOWN_GRACE_SECS", "-1")])),
            Err(Error::InvalidConfig("SHUTDOWN_GRACE_SECS", _))
        ));
    }

    #[test]
    fn test_parse_caches_rejects_bad_entries() {
        assert!(matches!(
            parse_caches("covers"),
            Err(Error::InvalidCacheSpec(_))
        ));
        assert!(matches!(
            parse_caches("../covers=http://x/{key}"),
            Err(Error::InvalidCacheSpec(_))
        ));
        assert!(matches!(
            parse_caches("a=http://x/{key},a=http://y/{key}"),
            Err(Error::DuplicateCache(_))
        ));
        assert!(parse_caches(" , ").unwrap().is_empty());
    }
}
