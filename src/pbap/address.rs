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

//! Folder paths and content addressing.

use crate::error::PbapError;

pub const TYPE_LISTING: &str = "x-bt/vcard-listing";
pub const TYPE_VCARD: &str = "x-bt/vcard";
pub const TYPE_PHONEBOOK: &str = "x-bt/phonebook";

pub const TELECOM_PATH: &str = "/telecom";
pub const PB_PATH: &str = "/telecom/pb";
pub const ICH_PATH: &str = "/telecom/ich";
pub const OCH_PATH: &str = "/telecom/och";
pub const MCH_PATH: &str = "/telecom/mch";
pub const CCH_PATH: &str = "/telecom/cch";

const SIM_TOKEN: &str = "SIM1";

const LEGAL_PATHS: [&str; 7] = ["", TELECOM_PATH, PB_PATH, ICH_PATH, OCH_PATH, MCH_PATH, CCH_PATH];

/// The three object types a GET may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Listing,
    VCard,
    Phonebook,
}

impl RequestType {
    /// Match a TYPE header, ignoring case.
    pub fn parse(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_lowercase();
        match mime.as_str() {
            TYPE_LISTING => Some(Self::Listing),
            TYPE_VCARD => Some(Self::VCard),
            TYPE_PHONEBOOK => Some(Self::Phonebook),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => TYPE_LISTING,
            Self::VCard => TYPE_VCARD,
            Self::Phonebook => TYPE_PHONEBOOK,
        }
    }
}

/// Logical content a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Phonebook,
    IncomingCalls,
    OutgoingCalls,
    MissedCalls,
    CombinedCalls,
}

impl ContentType {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "pb" => Some(Self::Phonebook),
            "ich" => Some(Self::IncomingCalls),
            "och" => Some(Self::OutgoingCalls),
            "mch" => Some(Self::MissedCalls),
            "cch" => Some(Self::CombinedCalls),
            _ => None,
        }
    }

    fn from_path(path: &str) -> Option<Self> {
        match path {
            PB_PATH => Some(Self::Phonebook),
            ICH_PATH => Some(Self::IncomingCalls),
            OCH_PATH => Some(Self::OutgoingCalls),
            MCH_PATH => Some(Self::MissedCalls),
            CCH_PATH => Some(Self::CombinedCalls),
            _ => None,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::Phonebook => PB_PATH,
            Self::IncomingCalls => ICH_PATH,
            Self::OutgoingCalls => OCH_PATH,
            Self::MissedCalls => MCH_PATH,
            Self::CombinedCalls => CCH_PATH,
        }
    }

    pub fn is_call_history(&self) -> bool {
        !matches!(self, Self::Phonebook)
    }
}

/// Resolved target of a GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentAddress {
    pub content: ContentType,
    pub path: String,
}

impl ContentAddress {
    /// The new-missed-calls count is reported only for missed-call content.
    pub fn needs_new_missed_calls(&self) -> bool {
        self.content == ContentType::MissedCalls
    }
}

/// Decide which content a request addresses.
///
/// Single-entry pulls and requests without a name use the current folder.
/// Everything else is resolved from the name.
pub fn resolve_address(
    request_type: RequestType,
    name: Option<&str>,
    current_path: &str,
) -> Result<ContentAddress, PbapError> {
    let name = name.filter(|n| !n.is_empty());

    match name {
        Some(name) if request_type != RequestType::VCard => {
            if name.contains(SIM_TOKEN) {
                return Err(PbapError::NotAcceptable(format!(
                    "SIM phonebook is not supported: {}",
                    name
                )));
            }
            let stem = name.strip_suffix(".vcf").unwrap_or(name);
            stem.split('/')
                .find_map(ContentType::from_token)
                .map(|content| ContentAddress {
                    content,
                    path: content.path().to_string(),
                })
                .ok_or_else(|| PbapError::NotFound(format!("no content named {}", name)))
        }
        _ => {
            if let Some(content) = ContentType::from_path(current_path) {
                return Ok(ContentAddress {
                    content,
                    path: current_path.to_string(),
                });
            }
            if current_path == TELECOM_PATH && request_type != RequestType::VCard {
                Err(PbapError::NotFound(format!(
                    "{} has no content of its own",
                    TELECOM_PATH
                )))
            } else {
                Err(PbapError::NotAcceptable(format!(
                    "wrong path for {}: '{}'",
                    request_type.as_str(),
                    current_path
                )))
            }
        }
    }
}

pub fn is_legal_path(path: &str) -> bool {
    LEGAL_PATHS.contains(&path)
}

/// Compute the folder a SetPath request moves to.
///
/// `name` is the NAME header; `None` resets to the root.
pub fn set_path(
    current: &str,
    name: Option<&str>,
    backup: bool,
    create: bool,
) -> Result<String, PbapError> {
    let next = if backup {
        match current.rfind('/') {
            Some(idx) => current[..idx].to_string(),
            None => String::new(),
        }
    } else {
        match name {
            None => String::new(),
            Some(name) => format!("{}/{}", current, name),
        }
    };

    if !next.is_empty() && !is_legal_path(&next) {
        return Err(if create {
            PbapError::Forbidden(format!("cannot create {}", next))
        } else {
            PbapError::NotFound(format!("no such folder {}", next))
        });
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_parse() {
        assert_eq!(RequestType::parse("x-bt/vcard-listing"), Some(RequestType::Listing));
        assert_eq!(RequestType::parse("X-BT/VCARD"), Some(RequestType::VCard));
        assert_eq!(RequestType::parse("x-bt/phonebook"), Some(RequestType::Phonebook));
        assert_eq!(RequestType::parse("text/plain"), None);
    }

    #[test]
    fn test_resolve_from_path() {
        let table = [
            (PB_PATH, ContentType::Phonebook),
            (ICH_PATH, ContentType::IncomingCalls),
            (OCH_PATH, ContentType::OutgoingCalls),
            (MCH_PATH, ContentType::MissedCalls),
            (CCH_PATH, ContentType::CombinedCalls),
        ];
        for (path, expected) in table {
            let addr = resolve_address(RequestType::Listing, None, path).unwrap();
            assert_eq!(addr.content, expected);
            let addr = resolve_address(RequestType::Listing, Some(""), path).unwrap();
            assert_eq!(addr.content, expected);
        }
    }

    #[test]
    fn test_vcard_pull_uses_path_not_name() {
        let addr = resolve_address(RequestType::VCard, Some("2.vcf"), MCH_PATH).unwrap();
        assert_eq!(addr.content, ContentType::MissedCalls);
        assert!(addr.needs_new_missed_calls());
    }

    #[test]
    fn test_resolve_from_name() {
        let addr =
            resolve_address(RequestType::Phonebook, Some("telecom/pb.vcf"), "").unwrap();
        assert_eq!(addr.content, ContentType::Phonebook);
        assert_eq!(addr.path, PB_PATH);

        let addr = resolve_address(RequestType::Listing, Some("cch"), TELECOM_PATH).unwrap();
        assert_eq!(addr.content, ContentType::CombinedCalls);
    }

    #[test]
    fn test_sim_rejected() {
        let err =
            resolve_address(RequestType::Phonebook, Some("SIM1/telecom/pb.vcf"), "").unwrap_err();
        assert!(matches!(err, PbapError::NotAcceptable(_)));
    }

    #[test]
    fn test_unknown_name_not_found() {
        let err = resolve_address(RequestType::Phonebook, Some("telecom/xyz.vcf"), "").unwrap_err();
        assert!(matches!(err, PbapError::NotFound(_)));
    }

    #[test]
    fn test_telecom_without_name() {
        let err = resolve_address(RequestType::Listing, None, TELECOM_PATH).unwrap_err();
        assert!(matches!(err, PbapError::NotFound(_)));

        let err = resolve_address(RequestType::VCard, Some("1.vcf"), TELECOM_PATH).unwrap_err();
        assert!(matches!(err, PbapError::NotAcceptable(_)));

        let err = resolve_address(RequestType::Listing, None, "").unwrap_err();
        assert!(matches!(err, PbapError::NotAcceptable(_)));
    }

    #[test]
    fn test_set_path_walk() {
        let path = set_path("", Some("telecom"), false, false).unwrap();
        assert_eq!(path, TELECOM_PATH);
        let path = set_path(&path, Some("pb"), false, false).unwrap();
        assert_eq!(path, PB_PATH);
        let path = set_path(&path, None, true, false).unwrap();
        assert_eq!(path, TELECOM_PATH);
        let path = set_path(&path, None, true, false).unwrap();
        assert_eq!(path, "");
        let path = set_path(&path, None, true, false).unwrap();
        assert_eq!(path, "");
    }

    #[test]
    fn test_set_path_root_reset() {
        assert_eq!(set_path(MCH_PATH, None, false, false).unwrap(), "");
    }

    #[test]
    fn test_set_path_illegal() {
        let err = set_path(TELECOM_PATH, Some("sms"), false, false).unwrap_err();
        assert!(matches!(err, PbapError::NotFound(_)));
        let err = set_path(TELECOM_PATH, Some("sms"), false, true).unwrap_err();
        assert!(matches!(err, PbapError::Forbidden(_)));
    }
}
