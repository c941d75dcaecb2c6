//! Address helpers
//!
//! A replica address is a full URI (`rntbd://host:port/apps/.../replicas/1p/`).
//! Connection-level rules only care about the connection endpoint behind it,
//! the *server key* `scheme://host:port`.

use url::Url;

/// Reduce an address to its `scheme://host:port` server key.
///
/// Returns `None` when the address is not a URI or has no host/port.
pub fn server_key(address: &str) -> Option<String> {
    let url = Url::parse(address).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{}://{}:{}", url.scheme(), host, port))
}

/// Reduce a list of addresses to their distinct server keys, keeping first-seen order.
///
/// Addresses that do not parse are kept verbatim.
pub fn server_keys<'a>(addresses: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for address in addresses {
        let key = server_key(address).unwrap_or_else(|| address.clone());
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_key_from_replica_address() {
        let key = server_key(
            "rntbd://node-1.westus.example.net:14364/apps/a1/partitions/p1/replicas/1p/",
        );
        assert_eq!(key.as_deref(), Some("rntbd://node-1.westus.example.net:14364"));
    }

    #[test]
    fn test_server_key_known_default_port() {
        let key = server_key("https://account-westus.example.net/");
        assert_eq!(key.as_deref(), Some("https://account-westus.example.net:443"));
    }

    #[test]
    fn test_server_key_rejects_garbage() {
        assert!(server_key("not a uri").is_none());
        assert!(server_key("rntbd://host-without-port/").is_none());
    }

    #[test]
    fn test_server_keys_dedupe() {
        let addresses = vec![
            "rntbd://n1:100/replicas/1p/".to_string(),
            "rntbd://n1:100/replicas/2s/".to_string(),
            "rntbd://n2:100/replicas/3s/".to_string(),
        ];
        assert_eq!(
            server_keys(&addresses),
            vec!["rntbd://n1:100".to_string(), "rntbd://n2:100".to_string()]
        );
    }
}
