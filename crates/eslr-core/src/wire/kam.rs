//! Keep-Alive Message record (spec §4.1, §GLOSSARY "KAM": Hello during
//! discovery, Hi during steady state).

use crate::error::DecodeError;
use crate::types::NeighborId;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::net::Ipv4Addr;

/// Wire length of [`KamRecord`] in bytes:
/// u8 + u8 + u16 + u8 + u16 + 4 + u32.
pub const KAM_LEN: usize = 15;

/// Distinguishes the two KAM purposes (spec §4.2): `Hello` during
/// neighbor discovery, `Hi` as the steady-state keep-alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KamKind {
    Hello,
    Hi,
}

impl KamKind {
    fn from_wire(v: u8) -> Self {
        match v {
            1 => KamKind::Hi,
            _ => KamKind::Hello,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            KamKind::Hello => 0,
            KamKind::Hi => 1,
        }
    }
}

/// Embedded authentication field (spec §3, KAM body).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KamAuth {
    pub auth_type: u8,
    pub auth_data: u16,
    pub identifier: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KamRecord {
    pub kind: KamKind,
    pub auth: KamAuth,
    pub neighbor_id: NeighborId,
    pub gateway: Ipv4Addr,
    pub gateway_mask: Ipv4Addr,
}

impl KamRecord {
    pub fn read_from(mut r: impl Read) -> Result<Self, DecodeError> {
        let kind = KamKind::from_wire(
            r.read_u8().map_err(|_| DecodeError::TruncatedRecord { index: 0 })?,
        );
        let auth_type = r
            .read_u8()
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;
        let auth_data = r
            .read_u16::<BigEndian>()
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;
        let identifier = r
            .read_u8()
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;
        let neighbor_id = NeighborId(
            r.read_u16::<BigEndian>()
                .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?,
        );
        let mut gw_bytes = [0u8; 4];
        r.read_exact(&mut gw_bytes)
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;
        let mask = r
            .read_u32::<BigEndian>()
            .map_err(|_| DecodeError::TruncatedRecord { index: 0 })?;

        Ok(KamRecord {
            kind,
            auth: KamAuth {
                auth_type,
                auth_data,
                identifier,
            },
            neighbor_id,
            gateway: Ipv4Addr::from(gw_bytes),
            gateway_mask: Ipv4Addr::from(mask),
        })
    }

    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        w.write_u8(self.kind.to_wire())?;
        w.write_u8(self.auth.auth_type)?;
        w.write_u16::<BigEndian>(self.auth.auth_data)?;
        w.write_u8(self.auth.identifier)?;
        w.write_u16::<BigEndian>(self.neighbor_id.0)?;
        w.write_all(&self.gateway.octets())?;
        w.write_u32::<BigEndian>(u32::from(self.gateway_mask))?;
        Ok(())
    }
}
