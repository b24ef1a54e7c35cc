//! Network interface info and the publish/ignore predicate.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub mac: String,
    pub up: bool,
    pub speed_mbps: Option<u64>,
    pub rx_bytes_per_sec: u64,
    pub tx_bytes_per_sec: u64,
}

/// Whether an interface belongs to the host's durable networking and should
/// be published externally. Ephemeral container/VM plumbing (veth pairs,
/// docker bridges, libvirt taps) is filtered out.
///
/// Published: `eth*`, `br<digits>`, `bond*`, `wlan*`.
/// Ignored: `veth*`, `tun*`, `tunl*`, `virbr*`, `docker*`, `br-*`, `br_*`,
/// `shim-*`, `shim_*`, `vhost*`, and anything else.
pub fn is_physical_interface(name: &str) -> bool {
    const IGNORED: &[&str] = &[
        "veth", "tunl", "tun", "virbr", "docker", "br-", "br_", "shim-", "shim_", "vhost",
    ];
    if IGNORED.iter().any(|prefix| name.starts_with(prefix)) {
        return false;
    }
    if name.starts_with("eth") || name.starts_with("bond") || name.starts_with("wlan") {
        return true;
    }
    // Numbered bridges (br0, br1) are physical; named bridges are caught by
    // the br-/br_ prefixes above.
    if let Some(rest) = name.strip_prefix("br") {
        return !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_names_published() {
        for name in ["eth0", "eth1", "br0", "br12", "bond0", "wlan0"] {
            assert!(is_physical_interface(name), "{name} should be published");
        }
    }

    #[test]
    fn test_virtual_names_ignored() {
        for name in [
            "veth12ab34", "tun0", "tunl0", "virbr0", "docker0", "br-4f2a", "br_lan", "shim-br0",
            "shim_br0", "vhost0", "lo",
        ] {
            assert!(!is_physical_interface(name), "{name} should be ignored");
        }
    }

    #[test]
    fn test_bare_br_is_not_physical() {
        assert!(!is_physical_interface("br"));
        assert!(!is_physical_interface("bridge"));
    }
}
