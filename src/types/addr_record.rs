use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use inetnum::addr::Prefix;
use serde::ser::SerializeStruct;
use serde_derive::Serialize;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::types::errors::TableError;
use crate::types::{Family, PrefixId};
use crate::AddressFamily;

const ADDR_BYTES: usize = 16;

//------------ Feedback ------------------------------------------------------

/// The per-record outcome of a bulk operation. Set by the engine only, a
/// record handed in with anything other than `None` is invalid.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, Serialize)]
pub enum Feedback {
    /// Nothing happened for this record: a duplicate, a missing entry, a
    /// conflict, or a test that did not match.
    #[default]
    None,
    Added,
    Deleted,
    /// The entry was kept, its negation flipped.
    Changed,
    Match,
    /// The statistics of the entry were zeroed.
    Cleared,
}

impl Feedback {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            Feedback::None => 0,
            Feedback::Match => 1,
            Feedback::Added => 2,
            Feedback::Deleted => 3,
            Feedback::Changed => 4,
            Feedback::Cleared => 5,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Feedback::None),
            1 => Some(Feedback::Match),
            2 => Some(Feedback::Added),
            3 => Some(Feedback::Deleted),
            4 => Some(Feedback::Changed),
            5 => Some(Feedback::Cleared),
            _ => None,
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::None => write!(f, "none"),
            Feedback::Added => write!(f, "added"),
            Feedback::Deleted => write!(f, "deleted"),
            Feedback::Changed => write!(f, "changed"),
            Feedback::Match => write!(f, "match"),
            Feedback::Cleared => write!(f, "cleared"),
        }
    }
}

//------------ AddrRecord ----------------------------------------------------

/// One address record as consumed and produced by every bulk operation.
///
/// The record is deliberately raw: the address is a 16 octet buffer of
/// which only the first 4 (IPv4) or 16 (IPv6) are significant, and the
/// prefix length is not checked against the family until the engine sees
/// the record. Use [AddrRecord::new], [AddrRecord::host] or the
/// [FromStr] impl (`"!192.0.2.0/24"`) to build well-formed records.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AddrRecord {
    pub family: Family,
    /// Prefix length.
    pub net: u8,
    pub negate: bool,
    pub addr: [u8; ADDR_BYTES],
    pub feedback: Feedback,
}

impl AddrRecord {
    pub fn new(prefix: Prefix, negate: bool) -> Self {
        let mut rec = Self::host(prefix.addr());
        rec.net = prefix.len();
        rec.negate = negate;
        rec
    }

    /// A full-width record for a single address.
    pub fn host(addr: IpAddr) -> Self {
        let mut buf = [0_u8; ADDR_BYTES];
        let (family, net) = match addr {
            IpAddr::V4(a) => {
                buf.iter_mut()
                    .zip(a.octets())
                    .for_each(|(dst, src)| *dst = src);
                (Family::Inet, Family::Inet.bits())
            }
            IpAddr::V6(a) => {
                buf = a.octets();
                (Family::Inet6, Family::Inet6.bits())
            }
        };
        Self {
            family,
            net,
            negate: false,
            addr: buf,
            feedback: Feedback::None,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn with_feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = feedback;
        self
    }

    /// The address part of the record, interpreted for its family.
    pub fn ip_addr(&self) -> IpAddr {
        match self.family {
            Family::Inet => {
                let mut octets = [0_u8; 4];
                octets
                    .iter_mut()
                    .zip(self.addr)
                    .for_each(|(dst, src)| *dst = src);
                IpAddr::from(octets)
            }
            Family::Inet6 => IpAddr::from(self.addr),
        }
    }

    /// The record as a prefix, `None` if the record is malformed.
    pub fn prefix(&self) -> Option<Prefix> {
        Prefix::new(self.ip_addr(), self.net).ok()
    }

    pub fn is_host(&self) -> bool {
        self.net == self.family.bits()
    }

    /// Validate the record against family `AF` and turn it into the key of
    /// the trie for that family.
    pub(crate) fn prefix_id<AF: AddressFamily>(
        &self,
    ) -> Result<PrefixId<AF>, TableError> {
        if self.family != AF::FAMILY {
            return Err(TableError::InvalidArgument("address family mismatch"));
        }
        if self.net > AF::BITS {
            return Err(TableError::InvalidArgument(
                "prefix length out of range",
            ));
        }
        if self.feedback != Feedback::None {
            return Err(TableError::InvalidArgument("feedback set on input"));
        }
        let width = AF::BITS as usize / 8;
        let (significant, rest) = self.addr.split_at(width);
        if rest.iter().any(|b| *b != 0) {
            return Err(TableError::InvalidArgument(
                "address bytes set beyond the family width",
            ));
        }
        let net = AF::read_from_bytes(significant).map_err(|_| {
            TableError::InvalidArgument("address does not fit the family")
        })?;
        let pfx = PrefixId::new(net, self.net);
        if !pfx.is_well_formed() {
            return Err(TableError::InvalidArgument(
                "host bits set beyond the prefix length",
            ));
        }
        Ok(pfx)
    }

    pub(crate) fn from_prefix_id<AF: AddressFamily>(
        pfx: PrefixId<AF>,
        negate: bool,
        feedback: Feedback,
    ) -> Self {
        let mut rec = Self::host(pfx.net().into_ipaddr());
        rec.net = pfx.len();
        rec.negate = negate;
        rec.feedback = feedback;
        rec
    }
}

impl fmt::Display for AddrRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            write!(f, "!")?;
        }
        write!(f, "{}/{}", self.ip_addr(), self.net)
    }
}

impl FromStr for AddrRecord {
    type Err = TableError;

    /// Parses `[!]addr[/len]`. Without a length the record is a host.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negate, s) = match s.trim().strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, s.trim()),
        };
        let rec = if s.contains('/') {
            let pfx = Prefix::from_str(s).map_err(|_| {
                TableError::InvalidArgument("cannot parse prefix")
            })?;
            AddrRecord::new(pfx, negate)
        } else {
            let addr = IpAddr::from_str(s).map_err(|_| {
                TableError::InvalidArgument("cannot parse address")
            })?;
            let mut rec = AddrRecord::host(addr);
            rec.negate = negate;
            rec
        };
        Ok(rec)
    }
}

impl From<Prefix> for AddrRecord {
    fn from(value: Prefix) -> Self {
        AddrRecord::new(value, false)
    }
}

impl serde::Serialize for AddrRecord {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("AddrRecord", 4)?;
        s.serialize_field("family", &self.family)?;
        s.serialize_field(
            "prefix",
            &format!("{}/{}", self.ip_addr(), self.net),
        )?;
        s.serialize_field("negate", &self.negate)?;
        s.serialize_field("feedback", &self.feedback)?;
        s.end()
    }
}

//------------ WireAddr ------------------------------------------------------

/// Fixed 20 octet layout of an [AddrRecord] on the control channel.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    FromBytes,
    IntoBytes,
    KnownLayout,
    Immutable,
    Unaligned,
)]
#[repr(C)]
pub struct WireAddr {
    pub addr: [u8; ADDR_BYTES],
    pub af: u8,
    pub net: u8,
    pub not: u8,
    pub fback: u8,
}

impl From<&AddrRecord> for WireAddr {
    fn from(value: &AddrRecord) -> Self {
        Self {
            addr: value.addr,
            af: value.family.to_wire(),
            net: value.net,
            not: value.negate as u8,
            fback: value.feedback.to_wire(),
        }
    }
}

impl TryFrom<&WireAddr> for AddrRecord {
    type Error = TableError;

    fn try_from(value: &WireAddr) -> Result<Self, Self::Error> {
        let family = Family::from_wire(value.af).ok_or(
            TableError::InvalidArgument("unknown address family"),
        )?;
        let feedback = Feedback::from_wire(value.fback)
            .ok_or(TableError::InvalidArgument("unknown feedback value"))?;
        let negate = match value.not {
            0 => false,
            1 => true,
            _ => {
                return Err(TableError::InvalidArgument(
                    "negation is not a boolean",
                ))
            }
        };
        Ok(Self {
            family,
            net: value.net,
            negate,
            addr: value.addr,
            feedback,
        })
    }
}

/// Decode a buffer of back-to-back [WireAddr] records. The buffer length
/// must be a multiple of the record size.
pub fn decode_records(buf: &[u8]) -> Result<Vec<AddrRecord>, TableError> {
    let wire = <[WireAddr]>::ref_from_bytes(buf).map_err(|_| {
        TableError::InvalidArgument("buffer is not a whole number of records")
    })?;
    wire.iter().map(AddrRecord::try_from).collect()
}

/// Encode records into back-to-back [WireAddr] records.
pub fn encode_records(records: &[AddrRecord]) -> Vec<u8> {
    let wire = records.iter().map(WireAddr::from).collect::<Vec<_>>();
    wire.as_slice().as_bytes().to_vec()
}
