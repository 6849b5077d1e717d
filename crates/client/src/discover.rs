// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LAN auto-discovery.
//!
//! Probes `127.0.0.1` first, then this host's own address, then the
//! rest of its /24 subnet, taking the first host whose `/health` (or
//! `/monitor/status`) answers within the per-host timeout.

use crate::client::{ClientError, RemoteLedger};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::net::{Ipv4Addr, UdpSocket};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    pub port: u16,
    /// Probe timeout per candidate host.
    pub per_host_timeout: Duration,
    /// Concurrent probes during the subnet sweep.
    pub parallelism: usize,
}

/// Matches the server's default deployment port.
pub const DEFAULT_PORT: u16 = 19_880;

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            per_host_timeout: Duration::from_millis(500),
            parallelism: 32,
        }
    }
}

/// Find a ledger server, preferring the most local candidate.
pub async fn discover(opts: DiscoverOptions) -> Result<RemoteLedger, ClientError> {
    // Localhost and our own address answer fastest; try them in order
    let mut preferred = vec![Ipv4Addr::LOCALHOST];
    let local = local_ipv4();
    if let Some(ip) = local {
        preferred.push(ip);
    }
    for ip in &preferred {
        if let Some(ledger) = probe(*ip, &opts).await {
            return Ok(ledger);
        }
    }

    // Sweep the /24 around our own address
    if let Some(ip) = local {
        let octets = ip.octets();
        let mut probes = FuturesUnordered::new();
        let mut hosts = (1u8..=254)
            .map(|last| Ipv4Addr::new(octets[0], octets[1], octets[2], last))
            .filter(|candidate| !preferred.contains(candidate));

        for candidate in hosts.by_ref().take(opts.parallelism) {
            probes.push(probe_owned(candidate, opts.clone()));
        }
        while let Some(result) = probes.next().await {
            if let Some(ledger) = result {
                return Ok(ledger);
            }
            if let Some(candidate) = hosts.next() {
                probes.push(probe_owned(candidate, opts.clone()));
            }
        }
    }

    Err(ClientError::Discovery(opts.port))
}

async fn probe(ip: Ipv4Addr, opts: &DiscoverOptions) -> Option<RemoteLedger> {
    let ledger = RemoteLedger::with_timeout(&ip.to_string(), opts.port, opts.per_host_timeout)
        .ok()?;
    match ledger.health().await {
        Ok(health) => {
            debug!(host = %ip, participant = %health.participant_id, "ledger server found");
            Some(ledger)
        }
        Err(_) => None,
    }
}

async fn probe_owned(ip: Ipv4Addr, opts: DiscoverOptions) -> Option<RemoteLedger> {
    probe(ip, &opts).await
}

/// This host's outward-facing IPv4 address (no packets are sent; the
/// connect only picks a route).
fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()? {
        std::net::SocketAddr::V4(addr) => Some(*addr.ip()),
        _ => None,
    }
}
