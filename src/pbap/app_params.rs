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

//! Application parameter (tag-length-value) codec.
//!
//! Requests carry their paging, search and filter options as a flat
//! sequence of `[tag:1][length:1][value:length]` triplets. Decoding is all
//! or nothing: any unknown tag or malformed length rejects the buffer.

use crate::error::PbapError;

/// Tag identifiers.
pub mod tag {
    pub const ORDER: u8 = 0x01;
    pub const SEARCH_VALUE: u8 = 0x02;
    pub const SEARCH_ATTRIBUTE: u8 = 0x03;
    pub const MAX_LIST_COUNT: u8 = 0x04;
    pub const LIST_START_OFFSET: u8 = 0x05;
    pub const PROPERTY_SELECTOR: u8 = 0x06;
    pub const FORMAT: u8 = 0x07;
    pub const PHONEBOOK_SIZE: u8 = 0x08;
    pub const NEW_MISSED_CALLS: u8 = 0x09;
    pub const PRIMARY_VERSION_COUNTER: u8 = 0x0A;
    pub const SECONDARY_VERSION_COUNTER: u8 = 0x0B;
    pub const VCARD_SELECTOR: u8 = 0x0C;
    pub const DATABASE_IDENTIFIER: u8 = 0x0D;
    pub const VCARD_SELECTOR_OPERATOR: u8 = 0x0E;
    pub const SUPPORTED_FEATURES: u8 = 0x10;
}

/// Peer feature bit: folder version counters.
pub const FEATURE_FOLDER_VERSION_COUNTER: u32 = 0x0008;
/// Peer feature bit: database identifier.
pub const FEATURE_DATABASE_IDENTIFIER: u32 = 0x0004;

/// Listing sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Indexed,
    Alphabetical,
    Phonetical,
    Reserved(u8),
}

impl From<u8> for SortOrder {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Indexed,
            1 => Self::Alphabetical,
            2 => Self::Phonetical,
            other => Self::Reserved(other),
        }
    }
}

impl From<SortOrder> for u8 {
    fn from(order: SortOrder) -> u8 {
        match order {
            SortOrder::Indexed => 0,
            SortOrder::Alphabetical => 1,
            SortOrder::Phonetical => 2,
            SortOrder::Reserved(v) => v,
        }
    }
}

/// Attribute a listing search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchAttribute {
    Name,
    Number,
    Sound,
    Reserved(u8),
}

impl From<u8> for SearchAttribute {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Name,
            1 => Self::Number,
            2 => Self::Sound,
            other => Self::Reserved(other),
        }
    }
}

impl From<SearchAttribute> for u8 {
    fn from(attr: SearchAttribute) -> u8 {
        match attr {
            SearchAttribute::Name => 0,
            SearchAttribute::Number => 1,
            SearchAttribute::Sound => 2,
            SearchAttribute::Reserved(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VCardVersion {
    #[default]
    V21,
    V30,
}

impl VCardVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V21 => "2.1",
            Self::V30 => "3.0",
        }
    }
}

/// How the bits of a vCard selector combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorOperator {
    /// At least one selected property must be present.
    #[default]
    Or,
    /// Every selected property must be present.
    And,
}

/// Options decoded from one request's application parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParameters {
    pub order: Option<SortOrder>,
    pub search_value: String,
    pub search_attribute: Option<SearchAttribute>,
    pub max_list_count: u16,
    /// Set by the `{0,0}` max-list-count sentinel.
    pub size_only: bool,
    pub list_start_offset: u16,
    /// Zero means "no filter".
    pub property_selector: u64,
    pub format: VCardVersion,
    /// Zero means "no selector".
    pub vcard_selector: u64,
    pub selector_operator: SelectorOperator,
    pub supported_features: Option<u32>,
}

impl Default for RequestParameters {
    fn default() -> Self {
        Self {
            order: None,
            search_value: String::new(),
            search_attribute: None,
            max_list_count: 0xFFFF,
            size_only: false,
            list_start_offset: 0,
            property_selector: 0,
            format: VCardVersion::V21,
            vcard_selector: 0,
            selector_operator: SelectorOperator::Or,
            supported_features: None,
        }
    }
}

fn fixed_len(tag_id: u8) -> Option<usize> {
    match tag_id {
        tag::ORDER
        | tag::SEARCH_ATTRIBUTE
        | tag::FORMAT
        | tag::VCARD_SELECTOR_OPERATOR => Some(1),
        tag::MAX_LIST_COUNT | tag::LIST_START_OFFSET => Some(2),
        tag::SUPPORTED_FEATURES => Some(4),
        tag::PROPERTY_SELECTOR | tag::VCARD_SELECTOR => Some(8),
        _ => None,
    }
}

fn be_u64(value: &[u8]) -> u64 {
    value.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

impl RequestParameters {
    /// Decode an application-parameter blob.
    pub fn decode(bytes: &[u8]) -> Result<Self, PbapError> {
        let mut params = Self::default();
        let mut i = 0;

        while i < bytes.len() {
            let tag_id = bytes[i];
            let len = *bytes
                .get(i + 1)
                .ok_or_else(|| PbapError::Parse(format!("tag 0x{:02X} has no length", tag_id)))?
                as usize;
            let value = bytes.get(i + 2..i + 2 + len).ok_or_else(|| {
                PbapError::Parse(format!("tag 0x{:02X} overruns buffer", tag_id))
            })?;

            if tag_id == tag::SEARCH_VALUE {
                if len == 0 {
                    return Err(PbapError::Parse("empty search value".into()));
                }
                let trimmed = match value.last() {
                    Some(0) => &value[..len - 1],
                    _ => value,
                };
                params.search_value = String::from_utf8_lossy(trimmed).into_owned();
            } else {
                let expected = fixed_len(tag_id)
                    .ok_or_else(|| PbapError::Parse(format!("unknown tag 0x{:02X}", tag_id)))?;
                if len != expected {
                    return Err(PbapError::Parse(format!(
                        "tag 0x{:02X} has length {}, expected {}",
                        tag_id, len, expected
                    )));
                }
                match tag_id {
                    tag::ORDER => params.order = Some(SortOrder::from(value[0])),
                    tag::SEARCH_ATTRIBUTE => {
                        params.search_attribute = Some(SearchAttribute::from(value[0]))
                    }
                    tag::MAX_LIST_COUNT => {
                        if value[0] == 0 && value[1] == 0 {
                            params.size_only = true;
                        } else {
                            params.max_list_count = u16::from_be_bytes([value[0], value[1]]);
                        }
                    }
                    tag::LIST_START_OFFSET => {
                        params.list_start_offset = u16::from_be_bytes([value[0], value[1]])
                    }
                    tag::PROPERTY_SELECTOR => params.property_selector = be_u64(value),
                    tag::FORMAT => {
                        params.format = if value[0] == 0 {
                            VCardVersion::V21
                        } else {
                            VCardVersion::V30
                        }
                    }
                    tag::VCARD_SELECTOR => params.vcard_selector = be_u64(value),
                    tag::VCARD_SELECTOR_OPERATOR => {
                        params.selector_operator = if value[0] == 0 {
                            SelectorOperator::Or
                        } else {
                            SelectorOperator::And
                        }
                    }
                    tag::SUPPORTED_FEATURES => {
                        params.supported_features = Some(be_u64(value) as u32)
                    }
                    _ => unreachable!("fixed_len covers every fixed tag"),
                }
            }

            i += 2 + len;
        }

        Ok(params)
    }

    /// Encode the fields that differ from their defaults.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(order) = self.order {
            put(&mut out, tag::ORDER, &[u8::from(order)]);
        }
        if !self.search_value.is_empty() {
            put(&mut out, tag::SEARCH_VALUE, self.search_value.as_bytes());
        }
        if let Some(attr) = self.search_attribute {
            put(&mut out, tag::SEARCH_ATTRIBUTE, &[u8::from(attr)]);
        }
        if self.size_only {
            put(&mut out, tag::MAX_LIST_COUNT, &[0, 0]);
        } else if self.max_list_count != 0xFFFF {
            put(&mut out, tag::MAX_LIST_COUNT, &self.max_list_count.to_be_bytes());
        }
        if self.list_start_offset != 0 {
            put(&mut out, tag::LIST_START_OFFSET, &self.list_start_offset.to_be_bytes());
        }
        if self.property_selector != 0 {
            put(&mut out, tag::PROPERTY_SELECTOR, &self.property_selector.to_be_bytes());
        }
        if self.format == VCardVersion::V30 {
            put(&mut out, tag::FORMAT, &[1]);
        }
        if self.vcard_selector != 0 {
            put(&mut out, tag::VCARD_SELECTOR, &self.vcard_selector.to_be_bytes());
        }
        if self.selector_operator == SelectorOperator::And {
            put(&mut out, tag::VCARD_SELECTOR_OPERATOR, &[1]);
        }
        if let Some(features) = self.supported_features {
            put(&mut out, tag::SUPPORTED_FEATURES, &features.to_be_bytes());
        }
        out
    }

    /// Whether the peer advertised `feature` in its supported-features mask.
    pub fn supports(&self, feature: u32) -> bool {
        self.supported_features
            .map(|f| f & feature != 0)
            .unwrap_or(false)
    }
}

fn put(out: &mut Vec<u8>, tag_id: u8, value: &[u8]) {
    out.push(tag_id);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
}

/// Builder for the application parameters sent back with a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseParameters {
    bytes: Vec<u8>,
}

impl ResponseParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phonebook_size(&mut self, size: u16) -> &mut Self {
        put(&mut self.bytes, tag::PHONEBOOK_SIZE, &size.to_be_bytes());
        self
    }

    /// Saturates at 255.
    pub fn new_missed_calls(&mut self, count: usize) -> &mut Self {
        put(&mut self.bytes, tag::NEW_MISSED_CALLS, &[count.min(0xFF) as u8]);
        self
    }

    pub fn primary_version_counter(&mut self, value: i64) -> &mut Self {
        put(
            &mut self.bytes,
            tag::PRIMARY_VERSION_COUNTER,
            &wide_value(value),
        );
        self
    }

    pub fn secondary_version_counter(&mut self, value: i64) -> &mut Self {
        put(
            &mut self.bytes,
            tag::SECONDARY_VERSION_COUNTER,
            &wide_value(value),
        );
        self
    }

    pub fn database_identifier(&mut self, value: i64) -> &mut Self {
        put(&mut self.bytes, tag::DATABASE_IDENTIFIER, &wide_value(value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// 128-bit big-endian field: eight zero bytes, then the value.
fn wide_value(value: i64) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[8..].copy_from_slice(&value.to_be_bytes());
    out
}
