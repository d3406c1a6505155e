//! The 8-byte base header shared by every ESLR packet (spec §4.1).

use crate::error::DecodeError;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Wire length of [`Header`] in bytes.
pub const HEADER_LEN: usize = 8;

/// The top-level command octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RouteUpdate,
    KeepAlive,
    ServerRouterCom,
}

impl Command {
    fn from_wire(v: u8) -> Result<Self, DecodeError> {
        match v {
            0 => Ok(Command::RouteUpdate),
            1 => Ok(Command::KeepAlive),
            2 => Ok(Command::ServerRouterCom),
            other => Err(DecodeError::UnknownCommand(other)),
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            Command::RouteUpdate => 0,
            Command::KeepAlive => 1,
            Command::ServerRouterCom => 2,
        }
    }
}

/// Route-update sub-command (only meaningful when `command ==
/// RouteUpdate`; carried as a plain field regardless, matching the
/// source's fixed-layout header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuSubCommand {
    None,
    Request,
    Response,
}

impl RuSubCommand {
    fn from_wire(v: u8) -> Self {
        match v {
            1 => RuSubCommand::Request,
            2 => RuSubCommand::Response,
            _ => RuSubCommand::None,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            RuSubCommand::None => 0,
            RuSubCommand::Request => 1,
            RuSubCommand::Response => 2,
        }
    }
}

/// What a Request sub-command is asking for (spec §4.1, §4.2).
///
/// Spec §9 flags `NeighborDiscovery` as source-ambiguous: the original
/// request dispatcher documents it as equivalent to `EntireTable` but
/// still iterates RUMs in its own branch. This implementation treats
/// the two as equivalent, per the spec's suggested resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    None,
    OneEntry,
    NEntries,
    EntireTable,
    NeighborDiscovery,
    RespondAll,
}

impl RequestType {
    fn from_wire(v: u8) -> Self {
        match v {
            1 => RequestType::OneEntry,
            2 => RequestType::NEntries,
            3 => RequestType::EntireTable,
            4 => RequestType::NeighborDiscovery,
            5 => RequestType::RespondAll,
            _ => RequestType::None,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            RequestType::None => 0,
            RequestType::OneEntry => 1,
            RequestType::NEntries => 2,
            RequestType::EntireTable => 3,
            RequestType::NeighborDiscovery => 4,
            RequestType::RespondAll => 5,
        }
    }

    /// Spec §9: `NeighborDiscovery` is treated as equivalent to
    /// `EntireTable` by the responder.
    pub fn wants_entire_table(self) -> bool {
        matches!(self, RequestType::EntireTable | RequestType::NeighborDiscovery)
    }
}

/// Bitset of advertisement flags (spec §4.1). Hand-rolled rather than
/// pulled in from a bitflags crate, matching the small inline bitsets
/// the rest of the stack rolls by hand (e.g. kernel neighbor-state
/// flags elsewhere in this workspace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdvertisementFlags(u8);

impl AdvertisementFlags {
    pub const FAST_TRIGGERED: u8 = 1 << 0;
    pub const PERIODIC: u8 = 1 << 1;
    pub const TRIGGERED: u8 = 1 << 2;
    pub const CONNECTED: u8 = 1 << 3;
    pub const DISCONNECTED: u8 = 1 << 4;

    pub const fn empty() -> Self {
        AdvertisementFlags(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        AdvertisementFlags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn with(mut self, flag: u8) -> Self {
        self.0 |= flag;
        self
    }

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// Authentication scheme (spec §3, §4.1). Only `Plaintext` behavior is
/// mandatory per spec §1's non-goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Plaintext,
    Md5,
    Sha,
}

impl AuthType {
    fn from_wire(v: u8) -> Self {
        match v {
            1 => AuthType::Md5,
            2 => AuthType::Sha,
            _ => AuthType::Plaintext,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            AuthType::Plaintext => 0,
            AuthType::Md5 => 1,
            AuthType::Sha => 2,
        }
    }
}

/// The 8-byte base header every ESLR packet carries (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command: Command,
    pub ru_subcommand: RuSubCommand,
    pub request_type: RequestType,
    pub count: u8,
    pub flags: AdvertisementFlags,
    pub auth_type: AuthType,
    pub auth_data: u16,
}

impl Header {
    pub fn read_from(mut r: impl Read) -> Result<Self, DecodeError> {
        let command = Command::from_wire(r.read_u8().map_err(|_| DecodeError::ShortHeader(0))?)?;
        let ru_subcommand =
            RuSubCommand::from_wire(r.read_u8().map_err(|_| DecodeError::ShortHeader(1))?);
        let request_type =
            RequestType::from_wire(r.read_u8().map_err(|_| DecodeError::ShortHeader(2))?);
        let count = r.read_u8().map_err(|_| DecodeError::ShortHeader(3))?;
        let flags = AdvertisementFlags::from_bits(
            r.read_u8().map_err(|_| DecodeError::ShortHeader(4))?,
        );
        let auth_type = AuthType::from_wire(r.read_u8().map_err(|_| DecodeError::ShortHeader(5))?);
        let auth_data = r
            .read_u16::<BigEndian>()
            .map_err(|_| DecodeError::ShortHeader(6))?;

        Ok(Header {
            command,
            ru_subcommand,
            request_type,
            count,
            flags,
            auth_type,
            auth_data,
        })
    }

    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        w.write_u8(self.command.to_wire())?;
        w.write_u8(self.ru_subcommand.to_wire())?;
        w.write_u8(self.request_type.to_wire())?;
        w.write_u8(self.count)?;
        w.write_u8(self.flags.bits())?;
        w.write_u8(self.auth_type.to_wire())?;
        w.write_u16::<BigEndian>(self.auth_data)?;
        Ok(())
    }
}
