//! CIDR blocks for `IpAddress` / `NotIpAddress` conditions

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// An IPv4 or IPv6 network, e.g. `10.0.0.0/8`
///
/// A bare address parses as a single-host network (`/32` or `/128`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Whether `addr` falls inside this network
    ///
    /// Addresses of the other family never match.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_v4(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_v6(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }

    /// Prefix length
    pub fn prefix(&self) -> u8 {
        self.prefix
    }
}

fn mask_v4(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

fn mask_v6(prefix: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0)
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s.trim(), None),
        };

        let network: IpAddr = addr
            .parse()
            .map_err(|_| format!("'{}' is not an IP address", addr))?;

        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| format!("'{}' is not a valid prefix length for {}", p, addr))?,
            None => max,
        };

        Ok(Self { network, prefix })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_ipv4_containment() {
        let block: Cidr = "10.0.0.0/8".parse().unwrap();
        assert!(block.contains(ip("10.1.2.3")));
        assert!(block.contains(ip("10.255.255.255")));
        assert!(!block.contains(ip("11.0.0.1")));
        assert!(!block.contains(ip("203.0.113.5")));
    }

    #[test]
    fn test_host_bits_are_ignored() {
        let block: Cidr = "192.168.1.77/24".parse().unwrap();
        assert!(block.contains(ip("192.168.1.1")));
        assert!(!block.contains(ip("192.168.2.1")));
    }

    #[test]
    fn test_bare_address_is_single_host() {
        let block: Cidr = "203.0.113.5".parse().unwrap();
        assert_eq!(block.prefix(), 32);
        assert!(block.contains(ip("203.0.113.5")));
        assert!(!block.contains(ip("203.0.113.6")));
    }

    #[test]
    fn test_zero_prefix_matches_everything() {
        let block: Cidr = "0.0.0.0/0".parse().unwrap();
        assert!(block.contains(ip("1.2.3.4")));
        assert!(block.contains(ip("255.255.255.255")));
    }

    #[test]
    fn test_ipv6() {
        let block: Cidr = "2001:db8::/32".parse().unwrap();
        assert!(block.contains(ip("2001:db8::1")));
        assert!(!block.contains(ip("2001:db9::1")));
        assert!(!block.contains(ip("10.0.0.1")));
    }

    #[test]
    fn test_invalid_blocks() {
        assert!("10.0.0.0/33".parse::<Cidr>().is_err());
        assert!("10.0.0/8".parse::<Cidr>().is_err());
        assert!("not-an-ip".parse::<Cidr>().is_err());
        assert!("10.0.0.0/abc".parse::<Cidr>().is_err());
    }
}
