#[cfg(test)]
use std::error::Error;

//------------ AddressFamily bit flippers -----------------------------------

#[test]
fn test_af_1() -> Result<(), Box<dyn Error>> {
    use crate::AddressFamily;
    use crate::IPv4;

    let bit_addr: IPv4 = 0b1111_1111_1111_1111_1111_1111_1111_1111_u32.into();

    assert_eq!(bit_addr.truncate_to_len(32), bit_addr);
    assert_eq!(
        bit_addr.truncate_to_len(28),
        IPv4::from(0b1111_1111_1111_1111_1111_1111_1111_0000_u32)
    );
    assert_eq!(bit_addr.truncate_to_len(1), IPv4::from(1_u32 << 31));
    assert_eq!(bit_addr.truncate_to_len(0), IPv4::zero());

    Ok(())
}

#[test]
fn test_af_2() -> Result<(), Box<dyn Error>> {
    use crate::AddressFamily;
    use crate::IPv6;

    let addr: std::net::Ipv6Addr = "2001:db8:ffff:ffff::1".parse()?;
    let bit_addr = IPv6::from_ipaddr(addr);
    let expect: std::net::Ipv6Addr = "2001:db8:ff00::".parse()?;

    assert_eq!(bit_addr.truncate_to_len(40), IPv6::from_ipaddr(expect));
    assert_eq!(bit_addr.truncate_to_len(128), bit_addr);
    assert_eq!(bit_addr.truncate_to_len(0), IPv6::zero());
    assert_eq!(bit_addr.into_ipaddr(), std::net::IpAddr::V6(addr));

    Ok(())
}

//------------ Address records -----------------------------------------------

#[test]
fn test_record_parse() -> Result<(), Box<dyn Error>> {
    use crate::types::{AddrRecord, Family, Feedback};

    let rec: AddrRecord = "!192.0.2.0/24".parse()?;
    assert_eq!(rec.family, Family::Inet);
    assert_eq!(rec.net, 24);
    assert!(rec.negate);
    assert_eq!(rec.feedback, Feedback::None);
    assert_eq!(rec.to_string(), "!192.0.2.0/24");

    let rec: AddrRecord = "2001:db8::1".parse()?;
    assert_eq!(rec.family, Family::Inet6);
    assert!(rec.is_host());
    assert_eq!(rec.to_string(), "2001:db8::1/128");

    assert!("192.0.2.1/24".parse::<AddrRecord>().is_err());
    assert!("192.0.2.0/33".parse::<AddrRecord>().is_err());
    assert!("not an address".parse::<AddrRecord>().is_err());

    Ok(())
}

#[test]
fn test_record_validation() -> Result<(), Box<dyn Error>> {
    use crate::errors::TableError;
    use crate::types::{AddrRecord, Family, Feedback};
    use crate::{IPv4, IPv6};

    let good: AddrRecord = "10.0.0.0/8".parse()?;
    let pfx = good.prefix_id::<IPv4>()?;
    assert_eq!(pfx.len(), 8);
    assert_eq!(pfx.to_string(), "10.0.0.0/8");

    // Right record, wrong trie.
    assert!(matches!(
        good.prefix_id::<IPv6>(),
        Err(TableError::InvalidArgument(_))
    ));

    let mut rec = good;
    rec.net = 33;
    assert!(rec.prefix_id::<IPv4>().is_err());

    // Host bits to the right of the prefix length.
    let mut rec = good;
    rec.net = 7;
    rec.addr = [10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    assert!(rec.prefix_id::<IPv4>().is_ok());
    rec.addr = [11, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    assert!(rec.prefix_id::<IPv4>().is_err());

    // Garbage in the unused tail of an IPv4 record.
    let mut rec = good;
    rec.addr = [10, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    assert!(rec.prefix_id::<IPv4>().is_err());

    let rec = good.with_feedback(Feedback::Added);
    assert!(rec.prefix_id::<IPv4>().is_err());

    let mut rec = AddrRecord::host("2001:db8::".parse()?);
    rec.net = 0;
    rec.addr = [0; 16];
    assert_eq!(rec.family, Family::Inet6);
    assert!(rec.prefix_id::<IPv6>()?.len() == 0);

    Ok(())
}

#[test]
fn test_wire_records() -> Result<(), Box<dyn Error>> {
    use crate::errors::TableError;
    use crate::types::addr_record::{decode_records, encode_records};
    use crate::types::{AddrRecord, Feedback};

    let records = vec![
        "10.0.0.0/8".parse::<AddrRecord>()?,
        "!2001:db8::/32"
            .parse::<AddrRecord>()?
            .with_feedback(Feedback::Changed),
    ];
    let buf = encode_records(&records);
    assert_eq!(buf.len(), 40);
    // family, prefix length, negation and feedback follow the address
    assert_eq!(buf.get(16..20), Some(&[2_u8, 8, 0, 0][..]));
    assert_eq!(buf.get(36..40), Some(&[24_u8, 32, 1, 4][..]));
    assert_eq!(decode_records(&buf)?, records);

    assert!(decode_records(buf.get(..39).unwrap_or_default()).is_err());

    let mut bad = buf.clone();
    if let Some(b) = bad.get_mut(16) {
        *b = 7;
    }
    assert_eq!(
        decode_records(&bad),
        Err(TableError::InvalidArgument("unknown address family"))
    );
    Ok(())
}
