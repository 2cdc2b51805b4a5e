// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! OBEX request/response packets.

use tokio::io::{AsyncRead, AsyncReadExt};

use super::{HeaderSet, ResponseCode};
use crate::error::PbapError;

/// OBEX protocol version 1.0.
pub const OBEX_VERSION: u8 = 0x10;

/// Largest packet this server accepts or produces.
pub const MAX_PACKET_LENGTH: u16 = 0xFFFE;

/// Smallest maximum packet length a peer may advertise.
pub const MIN_PACKET_LENGTH: u16 = 255;

const FINAL_BIT: u8 = 0x80;

/// Request operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Connect,
    Disconnect,
    Put,
    Get,
    SetPath,
    Abort,
}

impl Opcode {
    /// Split a raw opcode byte into the operation and its final bit.
    pub fn parse(raw: u8) -> Option<(Self, bool)> {
        let is_final = raw & FINAL_BIT != 0;
        let op = match raw {
            0xFF => return Some((Self::Abort, true)),
            0x80 => Self::Connect,
            0x81 => Self::Disconnect,
            0x02 | 0x82 => Self::Put,
            0x03 | 0x83 => Self::Get,
            0x85 => Self::SetPath,
            _ => return None,
        };
        Some((op, is_final))
    }

    fn as_u8(&self) -> u8 {
        match self {
            Self::Connect => 0x80,
            Self::Disconnect => 0x81,
            Self::Put => 0x02,
            Self::Get => 0x03,
            Self::SetPath => 0x85,
            Self::Abort => 0xFF,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::Put => "PUT",
            Self::Get => "GET",
            Self::SetPath => "SETPATH",
            Self::Abort => "ABORT",
        }
    }
}

/// Fields that follow the length in Connect requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectInfo {
    pub version: u8,
    pub flags: u8,
    pub max_packet_length: u16,
}

impl ConnectInfo {
    pub fn local() -> Self {
        Self {
            version: OBEX_VERSION,
            flags: 0,
            max_packet_length: MAX_PACKET_LENGTH,
        }
    }

    fn decode(buf: &[u8]) -> Result<Self, PbapError> {
        match buf {
            [version, flags, hi, lo, ..] => Ok(Self {
                version: *version,
                flags: *flags,
                max_packet_length: u16::from_be_bytes([*hi, *lo]),
            }),
            _ => Err(PbapError::Parse("truncated connect fields".into())),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.push(self.flags);
        out.extend_from_slice(&self.max_packet_length.to_be_bytes());
    }
}

/// SetPath flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPathFlags {
    pub backup: bool,
    pub create: bool,
}

impl SetPathFlags {
    fn from_u8(flags: u8) -> Self {
        Self {
            backup: flags & 0x01 != 0,
            create: flags & 0x02 == 0,
        }
    }

    fn as_u8(&self) -> u8 {
        let mut flags = 0;
        if self.backup {
            flags |= 0x01;
        }
        if !self.create {
            flags |= 0x02;
        }
        flags
    }
}

/// A decoded request packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub opcode: Opcode,
    pub is_final: bool,
    pub connect: Option<ConnectInfo>,
    pub set_path: Option<SetPathFlags>,
    pub headers: HeaderSet,
}

impl Request {
    pub fn new(opcode: Opcode, headers: HeaderSet) -> Self {
        Self {
            opcode,
            is_final: true,
            connect: (opcode == Opcode::Connect).then(ConnectInfo::local),
            set_path: (opcode == Opcode::SetPath).then_some(SetPathFlags {
                backup: false,
                create: false,
            }),
            headers,
        }
    }

    /// Decode a complete packet as read by [`read_packet`].
    pub fn decode(frame: &[u8]) -> Result<Self, PbapError> {
        if frame.len() < 3 {
            return Err(PbapError::Parse("short packet".into()));
        }
        let (opcode, is_final) = Opcode::parse(frame[0])
            .ok_or_else(|| PbapError::Parse(format!("unknown opcode 0x{:02X}", frame[0])))?;

        let mut rest = &frame[3..];
        let mut connect = None;
        let mut set_path = None;
        match opcode {
            Opcode::Connect => {
                connect = Some(ConnectInfo::decode(rest)?);
                rest = &rest[4..];
            }
            Opcode::SetPath => {
                let flags = *rest
                    .first()
                    .ok_or_else(|| PbapError::Parse("truncated setpath fields".into()))?;
                if rest.len() < 2 {
                    return Err(PbapError::Parse("truncated setpath fields".into()));
                }
                set_path = Some(SetPathFlags::from_u8(flags));
                rest = &rest[2..];
            }
            _ => {}
        }

        Ok(Self {
            opcode,
            is_final,
            connect,
            set_path,
            headers: HeaderSet::decode(rest)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut raw = self.opcode.as_u8();
        if self.is_final {
            raw |= FINAL_BIT;
        }
        let mut out = vec![raw, 0, 0];
        if let Some(info) = &self.connect {
            info.encode(&mut out);
        }
        if let Some(flags) = &self.set_path {
            out.push(flags.as_u8());
            out.push(0);
        }
        self.headers.encode(&mut out);
        let len = out.len() as u16;
        out[1..3].copy_from_slice(&len.to_be_bytes());
        out
    }
}

/// A response packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub connect: Option<ConnectInfo>,
    pub headers: HeaderSet,
}

impl Response {
    pub fn new(code: ResponseCode) -> Self {
        Self {
            code,
            connect: None,
            headers: HeaderSet::new(),
        }
    }

    pub fn with_headers(code: ResponseCode, headers: HeaderSet) -> Self {
        Self {
            code,
            connect: None,
            headers,
        }
    }

    /// Reply to a Connect request; carries the local connect fields.
    pub fn connect(code: ResponseCode, headers: HeaderSet) -> Self {
        Self {
            code,
            connect: Some(ConnectInfo::local()),
            headers,
        }
    }

    /// Size of the packet before any headers.
    pub fn prefix_len(&self) -> usize {
        if self.connect.is_some() {
            7
        } else {
            3
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.code.as_u8(), 0, 0];
        if let Some(info) = &self.connect {
            info.encode(&mut out);
        }
        self.headers.encode(&mut out);
        let len = out.len() as u16;
        out[1..3].copy_from_slice(&len.to_be_bytes());
        out
    }

    /// Decode a response; `to_connect` says whether it answers a Connect.
    pub fn decode(frame: &[u8], to_connect: bool) -> Result<Self, PbapError> {
        if frame.len() < 3 {
            return Err(PbapError::Parse("short packet".into()));
        }
        let code = ResponseCode::from_u8(frame[0])
            .ok_or_else(|| PbapError::Parse(format!("unknown response 0x{:02X}", frame[0])))?;
        let mut rest = &frame[3..];
        let mut connect = None;
        if to_connect {
            connect = Some(ConnectInfo::decode(rest)?);
            rest = &rest[4..];
        }
        Ok(Self {
            code,
            connect,
            headers: HeaderSet::decode(rest)?,
        })
    }
}

/// Read one whole packet. Returns `None` on a clean end of stream.
pub async fn read_packet<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let first = match reader.read_u8().await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let len = reader.read_u16().await? as usize;
    if len < 3 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("packet length {} too short", len),
        ));
    }
    let mut frame = vec![0u8; len];
    frame[0] = first;
    frame[1..3].copy_from_slice(&(len as u16).to_be_bytes());
    reader.read_exact(&mut frame[3..]).await?;
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obex::Header;

    #[test]
    fn test_connect_request_roundtrip() {
        let headers = HeaderSet::new().with(Header::Target(vec![0xAA; 16]));
        let request = Request::new(Opcode::Connect, headers);
        let raw = request.encode();
        assert_eq!(raw[0], 0x80);
        assert_eq!(u16::from_be_bytes([raw[1], raw[2]]) as usize, raw.len());

        let decoded = Request::decode(&raw).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.connect.unwrap().max_packet_length, MAX_PACKET_LENGTH);
    }

    #[test]
    fn test_setpath_flags() {
        // backup, don't create
        let raw = [0x85, 0x00, 0x05, 0x03, 0x00];
        let request = Request::decode(&raw).unwrap();
        assert_eq!(
            request.set_path,
            Some(SetPathFlags {
                backup: true,
                create: false
            })
        );

        let raw = [0x85, 0x00, 0x05, 0x00, 0x00];
        let request = Request::decode(&raw).unwrap();
        assert_eq!(
            request.set_path,
            Some(SetPathFlags {
                backup: false,
                create: true
            })
        );
    }

    #[test]
    fn test_get_final_bit() {
        let request = Request::decode(&[0x03, 0x00, 0x03]).unwrap();
        assert_eq!(request.opcode, Opcode::Get);
        assert!(!request.is_final);

        let request = Request::decode(&[0x83, 0x00, 0x03]).unwrap();
        assert!(request.is_final);
    }

    #[test]
    fn test_unknown_opcode() {
        assert!(Request::decode(&[0x07, 0x00, 0x03]).is_err());
    }

    #[test]
    fn test_response_encoding() {
        let response = Response::with_headers(
            ResponseCode::Success,
            HeaderSet::new().with(Header::EndOfBody(b"hi".to_vec())),
        );
        let raw = response.encode();
        assert_eq!(raw, vec![0xA0, 0x00, 0x08, 0x49, 0x00, 0x05, b'h', b'i']);
        assert_eq!(Response::decode(&raw, false).unwrap(), response);
    }

    #[tokio::test]
    async fn test_read_packet() {
        let raw = Request::new(Opcode::Disconnect, HeaderSet::new()).encode();
        let mut stream: &[u8] = &raw;
        let frame = read_packet(&mut stream).await.unwrap().unwrap();
        assert_eq!(frame, raw);
        assert!(read_packet(&mut stream).await.unwrap().is_none());
    }
}
