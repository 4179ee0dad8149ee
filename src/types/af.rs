use std::net::IpAddr;

use serde_derive::Serialize;
use zerocopy::{NetworkEndian, U128};

//------------ Family --------------------------------------------------------

/// The address family of a table entry, or of an address record on the
/// control channel.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Family {
    Inet,
    Inet6,
}

impl Family {
    /// Width of an address of this family in bits.
    pub fn bits(self) -> u8 {
        match self {
            Family::Inet => IPv4::BITS,
            Family::Inet6 => IPv6::BITS,
        }
    }

    /// Width of an address of this family in octets.
    pub fn addr_len(self) -> usize {
        self.bits() as usize / 8
    }

    pub(crate) fn to_wire(self) -> u8 {
        match self {
            Family::Inet => 2,
            Family::Inet6 => 24,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Option<Self> {
        match value {
            2 => Some(Family::Inet),
            24 => Some(Family::Inet6),
            _ => None,
        }
    }
}

impl From<IpAddr> for Family {
    fn from(value: IpAddr) -> Self {
        match value {
            IpAddr::V4(_) => Family::Inet,
            IpAddr::V6(_) => Family::Inet6,
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Inet => write!(f, "inet"),
            Family::Inet6 => write!(f, "inet6"),
        }
    }
}

//------------ AddressFamily (trait) ----------------------------------------
//
/// The address family of an IP address as a Trait.
///
/// Each family has a separate type that takes exactly the amount of memory
/// its addresses need, so the per-family halves of a table can be generic
/// over it.
pub trait AddressFamily:
    std::fmt::Debug
    + std::hash::Hash
    + Eq
    + Ord
    + Copy
    + Send
    + Sync
    + 'static
    + std::ops::BitAnd<Output = Self>
    + zerocopy::FromBytes
    + zerocopy::IntoBytes
    + zerocopy::KnownLayout
    + zerocopy::Immutable
    + zerocopy::Unaligned
{
    /// The number of bits in the byte representation of the family.
    const BITS: u8;

    /// The enum value naming this family.
    const FAMILY: Family;

    /// The std::net type that the value of self belongs to.
    type InnerIpAddr;

    fn zero() -> Self;

    fn from_ipaddr(ip_addr: Self::InnerIpAddr) -> Self;

    /// Returns the address if `ip_addr` belongs to this family.
    fn try_from_ipaddr(ip_addr: IpAddr) -> Option<Self>;

    /// Turn self in to a [std::net::IpAddr].
    fn into_ipaddr(self) -> IpAddr;

    /// fill the bits after the specified len with zeros. Interpreted as an IP
    /// Prefix, this means that self will be truncated to the specified len.
    fn truncate_to_len(self, len: u8) -> Self;
}

//-------------- Ipv4 Type --------------------------------------------------

/// Exactly fitting IPv4 bytes (4 octets).
pub type IPv4 = zerocopy::U32<NetworkEndian>;

impl AddressFamily for IPv4 {
    const BITS: u8 = 32;
    const FAMILY: Family = Family::Inet;
    type InnerIpAddr = std::net::Ipv4Addr;

    fn zero() -> Self {
        0.into()
    }

    fn from_ipaddr(ip_addr: Self::InnerIpAddr) -> Self {
        IPv4::from(ip_addr.octets())
    }

    fn try_from_ipaddr(ip_addr: IpAddr) -> Option<Self> {
        match ip_addr {
            IpAddr::V4(addr) => Some(Self::from_ipaddr(addr)),
            IpAddr::V6(_) => None,
        }
    }

    fn into_ipaddr(self) -> IpAddr {
        IpAddr::V4(std::net::Ipv4Addr::from(u32::from(self)))
    }

    fn truncate_to_len(self, len: u8) -> Self {
        self & ((1_u32.rotate_right(len as u32)
            ^ 1_u32.saturating_sub(len as u32))
        .wrapping_sub(1)
            ^ u32::MAX)
    }
}

//-------------- Ipv6 Type --------------------------------------------------

/// Exactly fitting IPv6 bytes (16 octets).
pub type IPv6 = U128<NetworkEndian>;

impl AddressFamily for IPv6 {
    const BITS: u8 = 128;
    const FAMILY: Family = Family::Inet6;
    type InnerIpAddr = std::net::Ipv6Addr;

    fn zero() -> Self {
        0.into()
    }

    fn from_ipaddr(ip_addr: Self::InnerIpAddr) -> Self {
        IPv6::from(ip_addr.octets())
    }

    fn try_from_ipaddr(ip_addr: IpAddr) -> Option<Self> {
        match ip_addr {
            IpAddr::V6(addr) => Some(Self::from_ipaddr(addr)),
            IpAddr::V4(_) => None,
        }
    }

    fn into_ipaddr(self) -> IpAddr {
        IpAddr::V6(std::net::Ipv6Addr::from(u128::from(self)))
    }

    fn truncate_to_len(self, len: u8) -> Self {
        self & ((1_u128.rotate_right(len as u32)
            ^ 1_u128.saturating_sub(len as u128))
        .wrapping_sub(1)
            ^ u128::MAX)
    }
}
