//! Wire codec for the ESLR packet format (spec §4.1).
//!
//! Spec §9: "Represent header bodies as a tagged variant
//! `{Rum(..), Kam(..), Src(..)}` parsed from the command octet; never
//! share a union with uninterpreted payload." [`Packet`] is that
//! variant.

mod header;
mod kam;
mod rum;
mod server;

pub use header::{
    AdvertisementFlags, AuthType, Command, Header, RequestType, RuSubCommand, HEADER_LEN,
};
pub use kam::{KamAuth, KamKind, KamRecord, KAM_LEN};
pub use rum::{RumRecord, RUM_LEN};
pub use server::{ServerRecord, SRC_LEN};

use crate::error::DecodeError;

/// A fully-parsed ESLR packet: the header plus its typed record list.
/// Loop suppression ("a packet whose source address matches a local
/// interface is silently dropped", spec §4.1) is not applied here — it
/// depends on the UDP source address, which is not part of the packet
/// body, and is applied by the engine at `on_receive` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    RouteUpdate {
        header: Header,
        records: Vec<RumRecord>,
    },
    KeepAlive {
        header: Header,
        records: Vec<KamRecord>,
    },
    ServerRouterCom {
        header: Header,
        records: Vec<ServerRecord>,
    },
}

impl Packet {
    pub fn header(&self) -> &Header {
        match self {
            Packet::RouteUpdate { header, .. }
            | Packet::KeepAlive { header, .. }
            | Packet::ServerRouterCom { header, .. } => header,
        }
    }
}

/// Parses a full ESLR packet from `bytes` (spec §4.1 failure modes).
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::ShortHeader(bytes.len()));
    }
    let mut cursor = &bytes[..HEADER_LEN];
    let header = Header::read_from(&mut cursor)?;
    let body = &bytes[HEADER_LEN..];

    match header.command {
        Command::RouteUpdate => {
            let records = decode_records(body, RUM_LEN, RumRecord::read_from)?;
            Ok(Packet::RouteUpdate { header, records })
        }
        Command::KeepAlive => {
            let records = decode_records(body, KAM_LEN, KamRecord::read_from)?;
            Ok(Packet::KeepAlive { header, records })
        }
        Command::ServerRouterCom => {
            let records = decode_records(body, SRC_LEN, ServerRecord::read_from)?;
            Ok(Packet::ServerRouterCom { header, records })
        }
    }
}

fn decode_records<T>(
    body: &[u8],
    record_size: usize,
    mut read_one: impl FnMut(&[u8]) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    if body.len() % record_size != 0 {
        return Err(DecodeError::RecordLengthMismatch {
            len: body.len(),
            record_size,
        });
    }
    body.chunks_exact(record_size)
        .enumerate()
        .map(|(index, chunk)| {
            read_one(chunk).map_err(|_| DecodeError::TruncatedRecord { index })
        })
        .collect()
}

/// Serializes a full ESLR packet into its wire representation.
pub fn encode(packet: &Packet) -> Vec<u8> {
    let mut out = Vec::new();
    packet
        .header()
        .write_to(&mut out)
        .expect("writing to a Vec<u8> never fails");

    match packet {
        Packet::RouteUpdate { records, .. } => {
            for rec in records {
                rec.write_to(&mut out).expect("writing to a Vec<u8> never fails");
            }
        }
        Packet::KeepAlive { records, .. } => {
            for rec in records {
                rec.write_to(&mut out).expect("writing to a Vec<u8> never fails");
            }
        }
        Packet::ServerRouterCom { records, .. } => {
            for rec in records {
                rec.write_to(&mut out).expect("writing to a Vec<u8> never fails");
            }
        }
    }
    out
}

/// Size in bytes of an IPv4 header with no options, assumed fixed per
/// spec §6's MTU-packing formula.
const IPV4_HEADER_LEN: usize = 20;
/// Size in bytes of a UDP header.
const UDP_HEADER_LEN: usize = 8;

/// Maximum number of fixed-size records of `record_size` bytes that fit
/// in one packet on an interface of the given MTU (spec §6):
/// `⌊(ifaceMTU − IPv4header − UDPheader − 8) / recordSize⌋`.
pub fn max_records_per_packet(mtu: u16, record_size: usize) -> usize {
    let overhead = IPV4_HEADER_LEN + UDP_HEADER_LEN + HEADER_LEN;
    let payload_budget = (mtu as usize).saturating_sub(overhead);
    payload_budget / record_size
}

/// Splits `records` into the minimum number of packets that respect
/// `mtu`, each carrying `header` (with `count` set per-packet).
pub fn pack_rum_packets(mut header: Header, records: &[RumRecord], mtu: u16) -> Vec<Packet> {
    let per_packet = max_records_per_packet(mtu, RUM_LEN).max(1);
    records
        .chunks(per_packet)
        .map(|chunk| {
            header.count = chunk.len() as u8;
            Packet::RouteUpdate {
                header,
                records: chunk.to_vec(),
            }
        })
        .collect()
}
