//! Server-Router Communication record (spec §4.1, §GLOSSARY "SRC"): a
//! server advertising its own service rate so the attached router can
//! fold it into the metric of its local route (spec §4.4, §4.6).

use crate::error::DecodeError;
use crate::types::SequenceNumber;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::net::Ipv4Addr;

/// Wire length of [`ServerRecord`] in bytes: u16 + u16 + u32 + u32 + 4 + u32.
pub const SRC_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerRecord {
    pub seq: SequenceNumber,
    pub flags: u16,
    /// Service rate μ, in the same units as `arrival_rate` (spec §4.4).
    pub service_rate: u32,
    /// Arrival rate λ.
    pub arrival_rate: u32,
    pub server_address: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl ServerRecord {
    pub fn read_from(mut r: impl Read) -> Result<Self, DecodeError> {
        let seq = SequenceNumber(
            r.read_u16::<BigEndian>()
                .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?,
        );
        let flags = r
            .read_u16::<BigEndian>()
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;
        let service_rate = r
            .read_u32::<BigEndian>()
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;
        let arrival_rate = r
            .read_u32::<BigEndian>()
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;
        let mut addr_bytes = [0u8; 4];
        r.read_exact(&mut addr_bytes)
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;
        let mask = r
            .read_u32::<BigEndian>()
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;

        Ok(ServerRecord {
            seq,
            flags,
            service_rate,
            arrival_rate,
            server_address: Ipv4Addr::from(addr_bytes),
            mask: Ipv4Addr::from(mask),
        })
    }

    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        w.write_u16::<BigEndian>(self.seq.0)?;
        w.write_u16::<BigEndian>(self.flags)?;
        w.write_u32::<BigEndian>(self.service_rate)?;
        w.write_u32::<BigEndian>(self.arrival_rate)?;
        w.write_all(&self.server_address.octets())?;
        w.write_u32::<BigEndian>(u32::from(self.mask))?;
        Ok(())
    }
}
