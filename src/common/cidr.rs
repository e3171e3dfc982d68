//! CIDR range construction (RFC 4632 / RFC 4291).
//!
//! The one place the engine mints [`IpNet`] values: resolver answers or
//! literal addresses plus the optional prefix lengths of a directive become
//! canonical, masked networks.

use std::net::IpAddr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

pub const DEFAULT_V4_PREFIX: u8 = 32;
pub const DEFAULT_V6_PREFIX: u8 = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    #[error("invalid IPv4 prefix length: {0}")]
    PrefixLen4(u8),
    #[error("invalid IPv6 prefix length: {0}")]
    PrefixLen6(u8),
}

/// Build one canonical network from an address and the prefix length for its
/// family. A missing prefix means a host network (/32 or /128).
pub fn ip_network(
    addr: IpAddr,
    prefix4: Option<u8>,
    prefix6: Option<u8>,
) -> Result<IpNet, CidrError> {
    match addr {
        IpAddr::V4(v4) => {
            let len = prefix4.unwrap_or(DEFAULT_V4_PREFIX);
            let net = Ipv4Net::new(v4, len).map_err(|_| CidrError::PrefixLen4(len))?;
            Ok(IpNet::V4(net.trunc()))
        }
        IpAddr::V6(v6) => {
            let len = prefix6.unwrap_or(DEFAULT_V6_PREFIX);
            let net = Ipv6Net::new(v6, len).map_err(|_| CidrError::PrefixLen6(len))?;
            Ok(IpNet::V6(net.trunc()))
        }
    }
}

/// Build networks for a whole answer set, routing each address to the prefix
/// length of its family.
pub fn ip_networks(
    addrs: &[IpAddr],
    prefix4: Option<u8>,
    prefix6: Option<u8>,
) -> Result<Vec<IpNet>, CidrError> {
    addrs
        .iter()
        .map(|addr| ip_network(*addr, prefix4, prefix6))
        .collect()
}
