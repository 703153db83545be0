//! URL validation for SSRF protection (spec §4.1).
//!
//! Grounded in `rootsignal-core::security::UrlValidator`, extended with the
//! port allowlist, blocked-TLD set and all-records DNS rebinding check this
//! spec requires.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::error::{HttpError, Result};

/// Ports an outbound request may target. Anything else is rejected before
/// a connection is attempted.
const ALLOWED_PORTS: &[u16] = &[80, 443];

/// TLDs that are never resolved, even if DNS would otherwise succeed.
const BLOCKED_TLDS: &[&str] = &[
    "test", "example", "invalid", "localhost", "local", "internal", "arpa",
    "intranet", "corp", "home", "lan", "kubernetes",
];

#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: HashSet<&'static str>,
    blocked_hosts: HashSet<String>,
    blocked_cidrs: Vec<ipnet::IpNet>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    pub fn new() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().collect(),
            blocked_hosts: [
                "localhost",
                "127.0.0.1",
                "::1",
                "0.0.0.0",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs: vec![
                // IPv4 private / reserved / special-use
                "10.0.0.0/8".parse().unwrap(),
                "172.16.0.0/12".parse().unwrap(),
                "192.168.0.0/16".parse().unwrap(),
                "169.254.0.0/16".parse().unwrap(), // link-local / cloud metadata
                "127.0.0.0/8".parse().unwrap(),    // loopback
                "0.0.0.0/8".parse().unwrap(),      // "this network"
                "100.64.0.0/10".parse().unwrap(),  // carrier-grade NAT
                "192.0.0.0/24".parse().unwrap(),
                "192.0.2.0/24".parse().unwrap(),   // TEST-NET-1
                "198.51.100.0/24".parse().unwrap(), // TEST-NET-2
                "203.0.113.0/24".parse().unwrap(), // TEST-NET-3
                "224.0.0.0/4".parse().unwrap(),    // multicast
                "240.0.0.0/4".parse().unwrap(),    // reserved
                "255.255.255.255/32".parse().unwrap(), // broadcast
                // IPv6
                "::1/128".parse().unwrap(),
                "::/128".parse().unwrap(),
                "fc00::/7".parse().unwrap(), // unique local
                "fe80::/10".parse().unwrap(), // link-local
                "ff00::/8".parse().unwrap(), // multicast
            ],
        }
    }

    /// Validate scheme, host, port and blocked TLD/address ranges, without
    /// touching the network. `RebindingRejected` covers the DNS-resolved
    /// case separately (see [`Self::resolve_and_check`]).
    pub fn validate(&self, url: &url::Url) -> Result<()> {
        if !self.allowed_schemes.contains(url.scheme()) {
            return Err(HttpError::UrlRejected(format!(
                "scheme '{}' not allowed",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| HttpError::UrlRejected("URL has no host".to_string()))?;
        if host.is_empty() {
            return Err(HttpError::UrlRejected("empty host".to_string()));
        }

        let port = url.port_or_known_default().unwrap_or(80);
        if !ALLOWED_PORTS.contains(&port) {
            return Err(HttpError::UrlRejected(format!("port {port} not allowed")));
        }

        if self.blocked_hosts.contains(host) {
            return Err(HttpError::UrlRejected(format!("host '{host}' is blocked")));
        }

        if let Some(tld) = host.rsplit('.').next() {
            if BLOCKED_TLDS.contains(&tld.to_ascii_lowercase().as_str()) {
                return Err(HttpError::UrlRejected(format!("TLD '.{tld}' is blocked")));
            }
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            self.check_ip(ip)?;
        }

        Ok(())
    }

    fn check_ip(&self, ip: IpAddr) -> Result<()> {
        for cidr in &self.blocked_cidrs {
            if cidr.contains(&ip) {
                return Err(HttpError::UrlRejected(format!(
                    "address {ip} falls in blocked range {cidr}"
                )));
            }
        }
        Ok(())
    }

    /// Resolve every A/AAAA record for `host` and reject if any falls in a
    /// blocked range (spec §4.1: "resolves (all A/AAAA records) to any
    /// ... blocked range"). Returns the validated addresses so the caller
    /// can connect directly to one, pinning the request against rebinding
    /// between this check and the TCP connect.
    pub async fn resolve_and_check(&self, host: &str, port: u16) -> Result<Vec<IpAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            self.check_ip(ip)?;
            return Ok(vec![ip]);
        }

        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| HttpError::Transport(format!("DNS resolution failed: {e}")))?;

        let ips: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
        if ips.is_empty() {
            return Err(HttpError::Transport(format!("no DNS records for {host}")));
        }
        for ip in &ips {
            self.check_ip(*ip)?;
        }
        Ok(ips)
    }

    /// Verify the peer address the connection actually reached. Called
    /// after `connect()` succeeds and before any response byte is exposed
    /// to the caller (spec §4.1, `RebindingRejected`).
    pub fn check_connected_peer(&self, peer: IpAddr) -> Result<()> {
        self.check_ip(peer)
            .map_err(|_| HttpError::RebindingRejected(peer.to_string()))
    }
}
