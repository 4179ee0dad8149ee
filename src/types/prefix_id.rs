use crate::AddressFamily;

//------------ PrefixId ------------------------------------------------------
//
// The key under which an entry lives in the trie of its family: the network
// address and the number of significant bits. Two entries with the same
// PrefixId are the same entry, regardless of their negation.
#[derive(Hash, Eq, PartialEq, Debug, Copy, Clone)]
pub struct PrefixId<AF: AddressFamily> {
    len: u8,
    net: AF,
}

impl<AF: AddressFamily> PrefixId<AF> {
    pub(crate) fn new(net: AF, len: u8) -> Self {
        PrefixId { len, net }
    }

    pub fn net(&self) -> AF {
        self.net
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    /// Full-width prefixes denote a single address, everything shorter is a
    /// network.
    pub fn is_host(&self) -> bool {
        self.len == AF::BITS
    }

    /// A prefix is well-formed if its length fits the family and no bits
    /// are set to the right of the length.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.len <= AF::BITS && self.net.truncate_to_len(self.len) == self.net
    }

    pub(crate) fn sort_key(&self) -> (AF, u8) {
        (self.net, self.len)
    }
}

impl<AF: AddressFamily> std::fmt::Display for PrefixId<AF> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.net.into_ipaddr(), self.len)
    }
}
