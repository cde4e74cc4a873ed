//! Device identity resolution
//!
//! Derives a stable identity from local platform facts: the CPU serial
//! number (invariant across reinstalls), the MAC address, and the current
//! IP address. Used to look up polling configuration and reported to the
//! configuration source. Pure local reads: no network call, never blocks,
//! never fails.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

/// Substituted when the platform cannot produce a CPU serial.
///
/// Fixed on purpose: a randomized fallback would break repeatable identity
/// across restarts, and the configuration source matches on this exact value.
pub const FALLBACK_SERIAL: &str = "FALLBACK_FIXED_ID";

const FALLBACK_MAC: &str = "00:00:00:00:00:00";
const FALLBACK_IP: &str = "127.0.0.1";

/// Stable identity of the edge device running this agent
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// CPU serial number, or [`FALLBACK_SERIAL`] when unavailable
    pub hardware_serial: String,
    /// MAC address of the first non-loopback interface
    pub mac_address: String,
    /// Current outbound IP address
    pub ip_address: String,
    /// Platform hostname
    pub hostname: String,
}

/// Resolves [`DeviceIdentity`] from platform state.
///
/// The platform file locations are injectable so tests can point at a
/// synthetic `/proc` and `/sys` tree.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    cpuinfo_path: PathBuf,
    net_class_path: PathBuf,
    hostname_path: PathBuf,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self {
            cpuinfo_path: PathBuf::from("/proc/cpuinfo"),
            net_class_path: PathBuf::from("/sys/class/net"),
            hostname_path: PathBuf::from("/proc/sys/kernel/hostname"),
        }
    }

    /// Build a resolver rooted at alternative platform paths (tests).
    pub fn with_paths(
        cpuinfo_path: impl Into<PathBuf>,
        net_class_path: impl Into<PathBuf>,
        hostname_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cpuinfo_path: cpuinfo_path.into(),
            net_class_path: net_class_path.into(),
            hostname_path: hostname_path.into(),
        }
    }

    /// Resolve the device identity. Deterministic for a given platform state.
    pub fn resolve(&self) -> DeviceIdentity {
        let hardware_serial = self.read_cpu_serial().unwrap_or_else(|| {
            warn!(
                "No usable CPU serial found, using fixed fallback '{}'",
                FALLBACK_SERIAL
            );
            FALLBACK_SERIAL.to_string()
        });

        let mac_address = self
            .read_mac_address()
            .unwrap_or_else(|| FALLBACK_MAC.to_string());

        let ip_address = outbound_ip().unwrap_or_else(|| FALLBACK_IP.to_string());

        let hostname = read_trimmed(&self.hostname_path).unwrap_or_else(|| "unknown".to_string());

        let identity = DeviceIdentity {
            hardware_serial,
            mac_address,
            ip_address,
            hostname,
        };
        debug!(
            "Resolved device identity: serial={} mac={} ip={}",
            identity.hardware_serial, identity.mac_address, identity.ip_address
        );
        identity
    }

    /// CPU serial from the `Serial` line of cpuinfo. An all-zero serial is
    /// what some boards report when the fuse is unprogrammed; it is rejected
    /// like a missing one.
    fn read_cpu_serial(&self) -> Option<String> {
        let content = fs::read_to_string(&self.cpuinfo_path).ok()?;
        for line in content.lines() {
            if let Some(rest) = line.strip_prefix("Serial") {
                if let Some(value) = rest.trim_start().strip_prefix(':') {
                    let serial = value.trim();
                    if !serial.is_empty() && serial.chars().any(|c| c != '0') {
                        return Some(serial.to_string());
                    }
                }
            }
        }
        None
    }

    /// MAC of the first non-loopback interface under `/sys/class/net`.
    fn read_mac_address(&self) -> Option<String> {
        let entries = fs::read_dir(&self.net_class_path).ok()?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "lo")
            .collect();
        names.sort();

        for name in names {
            let address_file = self.net_class_path.join(&name).join("address");
            if let Some(mac) = read_trimmed(&address_file) {
                if !mac.is_empty() && mac != FALLBACK_MAC {
                    return Some(mac);
                }
            }
        }
        None
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// Outbound IP via the connected-UDP-socket trick. The connect is a local
/// routing-table operation; no packet leaves the host.
fn outbound_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}
