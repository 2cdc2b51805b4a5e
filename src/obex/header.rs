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

//! OBEX header identifiers and their wire encoding.

use crate::error::PbapError;

/// Header identifiers understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderId {
    Count,
    Name,
    Type,
    Length,
    Target,
    Body,
    EndOfBody,
    Who,
    ConnectionId,
    ApplicationParameters,
    AuthChallenge,
    AuthResponse,
}

impl HeaderId {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Count => 0xC0,
            Self::Name => 0x01,
            Self::Type => 0x42,
            Self::Length => 0xC3,
            Self::Target => 0x46,
            Self::Body => 0x48,
            Self::EndOfBody => 0x49,
            Self::Who => 0x4A,
            Self::ConnectionId => 0xCB,
            Self::ApplicationParameters => 0x4C,
            Self::AuthChallenge => 0x4D,
            Self::AuthResponse => 0x4E,
        }
    }

    pub fn from_u8(id: u8) -> Option<Self> {
        match id {
            0xC0 => Some(Self::Count),
            0x01 => Some(Self::Name),
            0x42 => Some(Self::Type),
            0xC3 => Some(Self::Length),
            0x46 => Some(Self::Target),
            0x48 => Some(Self::Body),
            0x49 => Some(Self::EndOfBody),
            0x4A => Some(Self::Who),
            0xCB => Some(Self::ConnectionId),
            0x4C => Some(Self::ApplicationParameters),
            0x4D => Some(Self::AuthChallenge),
            0x4E => Some(Self::AuthResponse),
            _ => None,
        }
    }
}

/// Encoding class carried in the top two bits of a header id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Text,
    Bytes,
    OneByte,
    FourBytes,
}

impl Encoding {
    fn of(id: u8) -> Self {
        match id >> 6 {
            0 => Self::Text,
            1 => Self::Bytes,
            2 => Self::OneByte,
            _ => Self::FourBytes,
        }
    }
}

/// A single OBEX header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Count(u32),
    /// An empty name is legal and distinct from an absent one.
    Name(String),
    Type(String),
    Length(u32),
    Target(Vec<u8>),
    Body(Vec<u8>),
    EndOfBody(Vec<u8>),
    Who(Vec<u8>),
    ConnectionId(u32),
    ApplicationParameters(Vec<u8>),
    AuthChallenge(Vec<u8>),
    AuthResponse(Vec<u8>),
    /// Any header not listed above; `data` holds the raw value bytes.
    Other { id: u8, data: Vec<u8> },
}

impl Header {
    fn id(&self) -> u8 {
        let known = match self {
            Self::Count(_) => HeaderId::Count,
            Self::Name(_) => HeaderId::Name,
            Self::Type(_) => HeaderId::Type,
            Self::Length(_) => HeaderId::Length,
            Self::Target(_) => HeaderId::Target,
            Self::Body(_) => HeaderId::Body,
            Self::EndOfBody(_) => HeaderId::EndOfBody,
            Self::Who(_) => HeaderId::Who,
            Self::ConnectionId(_) => HeaderId::ConnectionId,
            Self::ApplicationParameters(_) => HeaderId::ApplicationParameters,
            Self::AuthChallenge(_) => HeaderId::AuthChallenge,
            Self::AuthResponse(_) => HeaderId::AuthResponse,
            Self::Other { id, .. } => return *id,
        };
        known.as_u8()
    }

    /// Number of bytes this header occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match Encoding::of(self.id()) {
            Encoding::OneByte => 2,
            Encoding::FourBytes => 5,
            Encoding::Text | Encoding::Bytes => 3 + self.value_bytes().len(),
        }
    }

    fn value_bytes(&self) -> Vec<u8> {
        match self {
            Self::Name(name) => encode_unicode(name),
            Self::Type(mime) => {
                let mut bytes = mime.as_bytes().to_vec();
                bytes.push(0);
                bytes
            }
            Self::Count(v) | Self::Length(v) | Self::ConnectionId(v) => v.to_be_bytes().to_vec(),
            Self::Target(b)
            | Self::Body(b)
            | Self::EndOfBody(b)
            | Self::Who(b)
            | Self::ApplicationParameters(b)
            | Self::AuthChallenge(b)
            | Self::AuthResponse(b) => b.clone(),
            Self::Other { data, .. } => data.clone(),
        }
    }

    /// Append the wire form of this header to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let id = self.id();
        out.push(id);
        let value = self.value_bytes();
        match Encoding::of(id) {
            Encoding::OneByte => out.push(value.first().copied().unwrap_or(0)),
            Encoding::FourBytes => {
                let mut word = [0u8; 4];
                let n = value.len().min(4);
                word[4 - n..].copy_from_slice(&value[value.len() - n..]);
                out.extend_from_slice(&word);
            }
            Encoding::Text | Encoding::Bytes => {
                let len = (3 + value.len()) as u16;
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(&value);
            }
        }
    }

    /// Decode one header from the front of `buf`, returning it and the bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), PbapError> {
        let id = *buf
            .first()
            .ok_or_else(|| PbapError::Parse("empty header".into()))?;
        let (value, consumed) = match Encoding::of(id) {
            Encoding::OneByte => {
                let b = buf
                    .get(1)
                    .ok_or_else(|| PbapError::Parse(format!("truncated header 0x{:02X}", id)))?;
                (vec![*b], 2)
            }
            Encoding::FourBytes => {
                let word = buf
                    .get(1..5)
                    .ok_or_else(|| PbapError::Parse(format!("truncated header 0x{:02X}", id)))?;
                (word.to_vec(), 5)
            }
            Encoding::Text | Encoding::Bytes => {
                let len_bytes = buf
                    .get(1..3)
                    .ok_or_else(|| PbapError::Parse(format!("truncated header 0x{:02X}", id)))?;
                let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
                if len < 3 {
                    return Err(PbapError::Parse(format!(
                        "header 0x{:02X} declares length {}",
                        id, len
                    )));
                }
                let value = buf.get(3..len).ok_or_else(|| {
                    PbapError::Parse(format!("header 0x{:02X} overruns packet", id))
                })?;
                (value.to_vec(), len)
            }
        };

        let header = match HeaderId::from_u8(id) {
            Some(HeaderId::Name) => Self::Name(decode_unicode(&value)?),
            Some(HeaderId::Type) => {
                let end = value.iter().position(|b| *b == 0).unwrap_or(value.len());
                Self::Type(String::from_utf8_lossy(&value[..end]).into_owned())
            }
            Some(HeaderId::Count) => Self::Count(be_u32(&value)),
            Some(HeaderId::Length) => Self::Length(be_u32(&value)),
            Some(HeaderId::ConnectionId) => Self::ConnectionId(be_u32(&value)),
            Some(HeaderId::Target) => Self::Target(value),
            Some(HeaderId::Body) => Self::Body(value),
            Some(HeaderId::EndOfBody) => Self::EndOfBody(value),
            Some(HeaderId::Who) => Self::Who(value),
            Some(HeaderId::ApplicationParameters) => Self::ApplicationParameters(value),
            Some(HeaderId::AuthChallenge) => Self::AuthChallenge(value),
            Some(HeaderId::AuthResponse) => Self::AuthResponse(value),
            None => Self::Other { id, data: value },
        };
        Ok((header, consumed))
    }
}

fn be_u32(value: &[u8]) -> u32 {
    value.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

/// Null-terminated UTF-16BE, or nothing at all for an empty string.
fn encode_unicode(text: &str) -> Vec<u8> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut out: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
    out.extend_from_slice(&[0, 0]);
    out
}

fn decode_unicode(value: &[u8]) -> Result<String, PbapError> {
    if value.len() % 2 != 0 {
        return Err(PbapError::Parse("odd-length unicode header".into()));
    }
    let units: Vec<u16> = value
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .take_while(|u| *u != 0)
        .collect();
    String::from_utf16(&units).map_err(|e| PbapError::Parse(e.to_string()))
}

/// Ordered collection of headers from one packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    headers: Vec<Header>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, header: Header) {
        self.headers.push(header);
    }

    pub fn with(mut self, header: Header) -> Self {
        self.add(header);
        self
    }

    /// Move every header from `other` to the end of this set.
    pub fn extend(&mut self, other: HeaderSet) {
        self.headers.extend(other.headers);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.headers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.headers.iter().find_map(|h| match h {
            Header::Name(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.headers.iter().find_map(|h| match h {
            Header::Type(mime) => Some(mime.as_str()),
            _ => None,
        })
    }

    pub fn target(&self) -> Option<&[u8]> {
        self.headers.iter().find_map(|h| match h {
            Header::Target(t) => Some(t.as_slice()),
            _ => None,
        })
    }

    pub fn who(&self) -> Option<&[u8]> {
        self.headers.iter().find_map(|h| match h {
            Header::Who(w) => Some(w.as_slice()),
            _ => None,
        })
    }

    pub fn connection_id(&self) -> Option<u32> {
        self.headers.iter().find_map(|h| match h {
            Header::ConnectionId(id) => Some(*id),
            _ => None,
        })
    }

    pub fn app_params(&self) -> Option<&[u8]> {
        self.headers.iter().find_map(|h| match h {
            Header::ApplicationParameters(p) => Some(p.as_slice()),
            _ => None,
        })
    }

    pub fn auth_challenge(&self) -> Option<&[u8]> {
        self.headers.iter().find_map(|h| match h {
            Header::AuthChallenge(c) => Some(c.as_slice()),
            _ => None,
        })
    }

    /// Concatenated Body and EndOfBody payloads.
    pub fn body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for header in &self.headers {
            if let Header::Body(b) | Header::EndOfBody(b) = header {
                out.extend_from_slice(b);
            }
        }
        out
    }

    pub fn has_end_of_body(&self) -> bool {
        self.headers
            .iter()
            .any(|h| matches!(h, Header::EndOfBody(_)))
    }

    pub fn encoded_len(&self) -> usize {
        self.headers.iter().map(Header::encoded_len).sum()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        for header in &self.headers {
            header.encode(out);
        }
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, PbapError> {
        let mut set = Self::new();
        while !buf.is_empty() {
            let (header, consumed) = Header::decode(buf)?;
            set.add(header);
            buf = &buf[consumed..];
        }
        Ok(set)
    }
}
