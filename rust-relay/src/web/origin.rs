//! Origin admission control.
//!
//! Requests are admitted only when their source address is an exact member of
//! a static allow-list. There is no CIDR matching and no normalization, so an
//! IPv4 peer seen as `::ffff:203.0.113.7` does not match `203.0.113.7`.

use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

/// Header set by a reverse proxy with the original client address.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// On-disk whitelist format.
#[derive(Debug, Deserialize)]
struct WhitelistFile {
    whitelisted_ips: Vec<String>,
}

/// Immutable set of permitted source addresses.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    addresses: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses
                .into_iter()
                .map(Into::into)
                .filter(|a: &String| !a.is_empty())
                .collect(),
        }
    }

    /// Load a whitelist file of the form `{"whitelisted_ips": [...]}`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let file: WhitelistFile =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let list = Self::new(file.whitelisted_ips);
        info!(path = %path.display(), entries = list.len(), "origin_allowlist_loaded");
        Ok(list)
    }

    /// Merge additional addresses. Only used while assembling startup state.
    pub fn with_addresses<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses
            .extend(extra.into_iter().map(Into::into).filter(|a: &String| !a.is_empty()));
        self
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Returns `true` iff `source_address` is exactly on the allow-list.
pub fn is_allowed(source_address: &str, allow_list: &AllowList) -> bool {
    allow_list.contains(source_address)
}

/// Determine the address a request originates from.
///
/// The forwarded-for header is consulted only when `trust_forwarded_for` is
/// set; it is spoofable by any client that can reach the listener directly.
/// For a proxy chain (`client, proxy1, proxy2`) the first entry is used.
/// Otherwise the transport peer IP is used.
pub fn resolve_source_address(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> Option<String> {
    if trust_forwarded_for {
        let forwarded = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(address) = forwarded {
            return Some(address.to_string());
        }
    }

    peer.map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::io::Write;

    fn allow_list() -> AllowList {
        AllowList::new(["203.0.113.7", "198.51.100.20"])
    }

    fn headers_with_forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_exact_member_allowed() {
        assert!(is_allowed("203.0.113.7", &allow_list()));
        assert!(is_allowed("198.51.100.20", &allow_list()));
    }

    #[test]
    fn test_prefix_and_partial_matches_rejected() {
        let list = allow_list();
        assert!(!is_allowed("203.0.113.70", &list));
        assert!(!is_allowed("203.0.113", &list));
        assert!(!is_allowed("198.51.100.2", &list));
        assert!(!is_allowed(" 203.0.113.7", &list));
        assert!(!is_allowed("", &list));
    }

    #[test]
    fn test_ipv4_mapped_not_normalized() {
        assert!(!is_allowed("::ffff:203.0.113.7", &allow_list()));
    }

    #[test]
    fn test_empty_allow_list_rejects_everything() {
        let list = AllowList::default();
        assert!(list.is_empty());
        assert!(!is_allowed("127.0.0.1", &list));
    }

    #[test]
    fn test_with_addresses_merges() {
        let list = allow_list().with_addresses(vec!["192.0.2.1".to_string(), String::new()]);
        assert_eq!(list.len(), 3);
        assert!(list.contains("192.0.2.1"));
    }

    #[test]
    fn test_resolve_uses_peer_when_forwarded_untrusted() {
        let headers = headers_with_forwarded("203.0.113.7");
        let peer: SocketAddr = "192.0.2.50:51234".parse().unwrap();

        assert_eq!(
            resolve_source_address(&headers, Some(peer), false),
            Some("192.0.2.50".to_string())
        );
    }

    #[test]
    fn test_resolve_uses_first_forwarded_hop_when_trusted() {
        let headers = headers_with_forwarded(" 203.0.113.7 , 10.0.0.2, 10.0.0.3");
        let peer: SocketAddr = "10.0.0.3:443".parse().unwrap();

        assert_eq!(
            resolve_source_address(&headers, Some(peer), true),
            Some("203.0.113.7".to_string())
        );
    }

    #[test]
    fn test_resolve_falls_back_to_peer_without_header() {
        let peer: SocketAddr = "[2001:db8::1]:8080".parse().unwrap();
        assert_eq!(
            resolve_source_address(&HeaderMap::new(), Some(peer), true),
            Some("2001:db8::1".to_string())
        );
    }

    #[test]
    fn test_resolve_none_without_any_source() {
        assert_eq!(resolve_source_address(&HeaderMap::new(), None, true), None);
        assert_eq!(
            resolve_source_address(&headers_with_forwarded(""), None, true),
            None
        );
    }

    #[test]
    fn test_load_whitelist_file() {
        let path = std::env::temp_dir().join(format!("relay-whitelist-{}.json", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"whitelisted_ips": ["203.0.113.7", "198.51.100.20"]}}"#).unwrap();

        let list = AllowList::load(&path).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains("198.51.100.20"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let err = AllowList::load(Path::new("/nonexistent/whitelist.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let path = std::env::temp_dir().join(format!("relay-whitelist-bad-{}.json", std::process::id()));
        fs::write(&path, r#"{"ips": []}"#).unwrap();

        let err = AllowList::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        fs::remove_file(&path).unwrap();
    }
}
