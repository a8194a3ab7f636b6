//! Mesh IP address allocation.
//!
//! Allocation happens on the bootstrap node only, at join time, while the
//! join lock is held; commitment is the immediate broadcast of the JOIN
//! user event. There is therefore no reservation registry here: the caller
//! passes the set of IPs currently in use and gets back a fresh one.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use rand::Rng;

use crate::error::{OverlayError, Result};

/// Allocator for mesh IPs within a CIDR range, optionally restricted to an
/// IPAM sub-range.
#[derive(Debug, Clone)]
pub struct MeshIpAllocator {
    cidr: Ipv4Net,
    ipam: Option<Ipv4Net>,
}

impl MeshIpAllocator {
    /// Create an allocator for the given mesh range.
    ///
    /// When `ipam` is given it must be fully contained in `cidr`.
    pub fn new(cidr: Ipv4Net, ipam: Option<Ipv4Net>) -> Result<Self> {
        if let Some(sub) = ipam {
            if !(cidr.contains(&sub.network()) && cidr.contains(&sub.broadcast())) {
                return Err(OverlayError::IpamNotInCidr {
                    ipam: sub.to_string(),
                    cidr: cidr.to_string(),
                });
            }
        }
        Ok(Self { cidr, ipam })
    }

    /// The range addresses are actually assigned from.
    pub fn effective_range(&self) -> Ipv4Net {
        self.ipam.unwrap_or(self.cidr)
    }

    /// The full mesh range.
    pub fn cidr(&self) -> Ipv4Net {
        self.cidr
    }

    fn host_bounds(&self) -> Result<(u32, u32)> {
        let net = self.effective_range();
        if net.prefix_len() > 30 {
            return Err(OverlayError::RangeTooSmall(net.to_string()));
        }
        let first = u32::from(net.network()) + 1;
        let last = u32::from(net.broadcast()) - 1;
        Ok((first, last))
    }

    /// Pick an unused mesh IP by uniformly sampling host addresses of the
    /// effective range, skipping the network and broadcast addresses and
    /// anything in `taken`.
    ///
    /// The retry loop is bounded proportionally to the range size and fails
    /// with [`OverlayError::AddressExhausted`] once the bound is reached.
    pub fn allocate(&self, taken: &HashSet<Ipv4Addr>) -> Result<Ipv4Addr> {
        let (first, last) = self.host_bounds()?;
        let span = (last - first + 1) as u64;
        let attempts = span.saturating_mul(2).clamp(16, 1 << 17);

        let mut rng = rand::thread_rng();
        for _ in 0..attempts {
            let candidate = Ipv4Addr::from(rng.gen_range(first..=last));
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(OverlayError::AddressExhausted(
            self.effective_range().to_string(),
        ))
    }

    /// Deterministic variant scanning from the first host address.
    pub fn allocate_sequential(&self, taken: &HashSet<Ipv4Addr>) -> Result<Ipv4Addr> {
        let (first, last) = self.host_bounds()?;
        for raw in first..=last {
            let candidate = Ipv4Addr::from(raw);
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(OverlayError::AddressExhausted(
            self.effective_range().to_string(),
        ))
    }

    /// Check whether an IP lies in the effective range.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.effective_range().contains(&ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(cidr: &str, ipam: Option<&str>) -> MeshIpAllocator {
        MeshIpAllocator::new(
            cidr.parse().unwrap(),
            ipam.map(|s| s.parse().unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn test_allocate_in_range() {
        let a = allocator("10.232.0.0/16", None);
        let taken = HashSet::new();
        for _ in 0..100 {
            let ip = a.allocate(&taken).unwrap();
            assert!(a.contains(ip));
            assert_ne!(ip, "10.232.0.0".parse::<Ipv4Addr>().unwrap());
            assert_ne!(ip, "10.232.255.255".parse::<Ipv4Addr>().unwrap());
        }
    }

    #[test]
    fn test_allocate_avoids_taken() {
        let a = allocator("10.232.0.0/30", None);
        // /30 has exactly two hosts: .1 and .2
        let mut taken = HashSet::new();
        taken.insert("10.232.0.1".parse().unwrap());
        let ip = a.allocate(&taken).unwrap();
        assert_eq!(ip, "10.232.0.2".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn test_allocate_exhausted() {
        let a = allocator("10.232.0.0/30", None);
        let taken: HashSet<Ipv4Addr> = ["10.232.0.1", "10.232.0.2"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        match a.allocate(&taken) {
            Err(OverlayError::AddressExhausted(_)) => {}
            other => panic!("expected AddressExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_ipam_restricts_range() {
        let a = allocator("10.232.0.0/16", Some("10.232.5.0/24"));
        let taken = HashSet::new();
        for _ in 0..50 {
            let ip = a.allocate(&taken).unwrap();
            assert!(ip.octets()[2] == 5, "IP {} outside IPAM range", ip);
        }
    }

    #[test]
    fn test_ipam_outside_cidr_rejected() {
        let res = MeshIpAllocator::new(
            "10.232.0.0/16".parse().unwrap(),
            Some("10.233.0.0/24".parse().unwrap()),
        );
        assert!(matches!(res, Err(OverlayError::IpamNotInCidr { .. })));
    }

    #[test]
    fn test_sequential_scan() {
        let a = allocator("10.232.0.0/24", None);
        let mut taken = HashSet::new();
        let first = a.allocate_sequential(&taken).unwrap();
        assert_eq!(first, "10.232.0.1".parse::<Ipv4Addr>().unwrap());
        taken.insert(first);
        let second = a.allocate_sequential(&taken).unwrap();
        assert_eq!(second, "10.232.0.2".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn test_range_too_small() {
        let a = allocator("10.232.0.0/31", None);
        assert!(matches!(
            a.allocate(&HashSet::new()),
            Err(OverlayError::RangeTooSmall(_))
        ));
    }
}
