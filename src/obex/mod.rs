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

//! OBEX packet framing and header encoding.
//!
//! Only the subset of OBEX needed by a PBAP server is modelled here:
//! Connect, Disconnect, SetPath, Get, Put and Abort requests, and the
//! headers those requests carry.

mod header;
mod packet;

pub use header::{Header, HeaderId, HeaderSet};
pub use packet::{
    read_packet, ConnectInfo, Opcode, Request, Response, SetPathFlags, MAX_PACKET_LENGTH,
    MIN_PACKET_LENGTH, OBEX_VERSION,
};

/// OBEX response codes, final bit included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Continue,
    Success,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    NotAcceptable,
    PreconditionFailed,
    InternalError,
    NotImplemented,
    ServiceUnavailable,
}

impl ResponseCode {
    /// Wire value of the response code.
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Continue => 0x90,
            Self::Success => 0xA0,
            Self::BadRequest => 0xC0,
            Self::Unauthorized => 0xC1,
            Self::Forbidden => 0xC3,
            Self::NotFound => 0xC4,
            Self::NotAcceptable => 0xC6,
            Self::PreconditionFailed => 0xCC,
            Self::InternalError => 0xD0,
            Self::NotImplemented => 0xD1,
            Self::ServiceUnavailable => 0xD3,
        }
    }

    /// Parse a wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x90 => Some(Self::Continue),
            0xA0 => Some(Self::Success),
            0xC0 => Some(Self::BadRequest),
            0xC1 => Some(Self::Unauthorized),
            0xC3 => Some(Self::Forbidden),
            0xC4 => Some(Self::NotFound),
            0xC6 => Some(Self::NotAcceptable),
            0xCC => Some(Self::PreconditionFailed),
            0xD0 => Some(Self::InternalError),
            0xD1 => Some(Self::NotImplemented),
            0xD3 => Some(Self::ServiceUnavailable),
            _ => None,
        }
    }

    /// Human readable name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::Success => "OK",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::NotAcceptable => "NOT_ACCEPTABLE",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::ServiceUnavailable => "UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:02X})", self.as_str(), self.as_u8())
    }
}
