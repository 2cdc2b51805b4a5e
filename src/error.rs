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

//! Error taxonomy for request handling.

use thiserror::Error;

use crate::obex::ResponseCode;

/// Errors raised while handling an OBEX/PBAP request.
#[derive(Debug, Error)]
pub enum PbapError {
    /// Malformed application parameters or OBEX headers.
    #[error("parse error: {0}")]
    Parse(String),

    /// GET without a TYPE header.
    #[error("missing type header")]
    MissingType,

    /// GET with a TYPE this server does not serve.
    #[error("unsupported type: {0}")]
    InvalidType(String),

    #[error("not acceptable: {0}")]
    NotAcceptable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A session received a message its current state does not accept.
    #[error("state violation: {0}")]
    StateViolation(String),

    /// The peer went away or a write failed mid-response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Nobody answered the consent prompt in time. Handled like a refusal.
    #[error("authorization timed out")]
    AuthTimeout,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl PbapError {
    /// OBEX response code reported to the peer for this error.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Self::Parse(_) | Self::MissingType | Self::InvalidType(_) => ResponseCode::BadRequest,
            Self::NotAcceptable(_) => ResponseCode::NotAcceptable,
            Self::NotFound(_) => ResponseCode::NotFound,
            Self::Forbidden(_) => ResponseCode::Forbidden,
            Self::NotImplemented(_) => ResponseCode::NotImplemented,
            Self::PreconditionFailed(_) => ResponseCode::PreconditionFailed,
            Self::AuthTimeout => ResponseCode::ServiceUnavailable,
            Self::StateViolation(_) | Self::Transport(_) | Self::Store(_) => {
                ResponseCode::InternalError
            }
        }
    }

    /// Whether the error must tear the whole session down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StateViolation(_) | Self::Transport(_))
    }
}

impl From<std::io::Error> for PbapError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
