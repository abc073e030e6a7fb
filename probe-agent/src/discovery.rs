//! Host identification for probe agents
//!
//! This module handles:
//! - Primary IPv4 detection with priority (Ethernet > WiFi > Other)
//! - Hostname and OS family label
//!
//! The identity is resolved once at startup and stamped on every snapshot.

use if_addrs::{get_if_addrs, IfAddr};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

pub const FALLBACK_IP: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Identity fields flattened into every report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub hostname: String,
    pub ip: String,
    pub system: String,
}

/// Interface type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum InterfaceType {
    Ethernet,
    Wireless,
    Other,
    Loopback,
}

impl HostIdentity {
    pub fn discover() -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().to_string();
        let system = os_label(std::env::consts::OS);

        let candidates = match get_if_addrs() {
            Ok(addrs) => addrs
                .into_iter()
                .filter_map(|iface| match iface.addr {
                    IfAddr::V4(v4) => Some((iface.name, v4.ip)),
                    IfAddr::V6(_) => None,
                })
                .collect(),
            Err(e) => {
                warn!("Failed to enumerate network interfaces: {e}");
                Vec::new()
            }
        };

        let ip = select_primary_ipv4(&candidates).unwrap_or_else(|| {
            warn!("No usable IPv4 interface, falling back to {FALLBACK_IP}");
            FALLBACK_IP
        });

        info!("Discovery complete - Hostname: {hostname}, IP: {ip}, OS: {system}");
        Self { hostname, ip: ip.to_string(), system }
    }
}

/// Family label as reported by the host ("Linux", "Darwin", "Windows").
fn os_label(os: &str) -> String {
    match os {
        "linux" => "Linux".to_string(),
        "macos" => "Darwin".to_string(),
        "windows" => "Windows".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => "Unknown".to_string(),
            }
        }
    }
}

/// Classify interface type based on name patterns
fn classify_interface(name: &str, ip: &Ipv4Addr) -> InterfaceType {
    let name_lower = name.to_lowercase();

    if ip.is_loopback() || name_lower == "lo" || name_lower.starts_with("lo0") {
        return InterfaceType::Loopback;
    }

    if name_lower.starts_with("wlan")
        || name_lower.starts_with("wlp")
        || name_lower.starts_with("wlo")
        || name_lower.contains("wi-fi")
        || name_lower.contains("wifi")
    {
        return InterfaceType::Wireless;
    }

    if name_lower.starts_with("eth")
        || name_lower.starts_with("en")
        || name_lower.starts_with("ethernet")
    {
        return InterfaceType::Ethernet;
    }

    InterfaceType::Other
}

/// First non-loopback IPv4 of the best interface class, enumeration order kept within a class.
fn select_primary_ipv4(candidates: &[(String, Ipv4Addr)]) -> Option<Ipv4Addr> {
    let best = candidates
        .iter()
        .map(|(name, ip)| (classify_interface(name, ip), name, ip))
        .filter(|(kind, _, ip)| *kind != InterfaceType::Loopback && !ip.is_unspecified())
        .min_by_key(|(kind, _, _)| *kind)?;

    debug!("Selected {:?} interface as primary: {}", best.0, best.1);
    Some(*best.2)
}
