//! Route Update Message record (spec §4.1, §GLOSSARY "RUM").

use crate::error::DecodeError;
use crate::types::{Ipv4Prefix, Metric, SequenceNumber};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::net::Ipv4Addr;

/// Wire length of [`RumRecord`] in bytes: u16 + u32 + u8 + u8 + 4 + u32.
pub const RUM_LEN: usize = 16;

/// One route, as carried on the wire. Distinct from
/// [`crate::route::RouteRecord`], which is the richer in-memory record
/// the tables keep (next-hop, interface, validity, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RumRecord {
    pub seq: SequenceNumber,
    pub metric: Metric,
    pub tag: u8,
    pub prefix: Ipv4Prefix,
}

impl RumRecord {
    pub fn read_from(mut r: impl Read) -> Result<Self, DecodeError> {
        let seq = SequenceNumber(
            r.read_u16::<BigEndian>()
                .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?,
        );
        let metric = Metric(
            r.read_u32::<BigEndian>()
                .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?,
        );
        let tag = r
            .read_u8()
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;
        let _reserved = r
            .read_u8()
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;
        let mut addr_bytes = [0u8; 4];
        r.read_exact(&mut addr_bytes)
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;
        let mask = r
            .read_u32::<BigEndian>()
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;

        Ok(RumRecord {
            seq,
            metric,
            tag,
            prefix: Ipv4Prefix::new(Ipv4Addr::from(addr_bytes), Ipv4Addr::from(mask)),
        })
    }

    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        w.write_u16::<BigEndian>(self.seq.0)?;
        w.write_u32::<BigEndian>(self.metric.0)?;
        w.write_u8(self.tag)?;
        w.write_u8(0)?; // reserved
        w.write_all(&self.prefix.network().octets())?;
        w.write_u32::<BigEndian>(u32::from(self.prefix.mask()))?;
        Ok(())
    }
}
