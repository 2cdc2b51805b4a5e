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

//! Property filtering and vCard selection.
//!
//! The property selector (filter) decides which lines of a vCard are sent.
//! The vCard selector decides whether a vCard is sent at all.

use super::app_params::{SelectorOperator, VCardVersion};

/// A filterable property.
struct FilterBit {
    pos: u8,
    prop: &'static str,
    /// Applies only to 2.1 cards; always included in 3.0.
    only_check_v21: bool,
    /// Never sent in 2.1 cards.
    exclude_for_v21: bool,
}

const fn bit(
    pos: u8,
    prop: &'static str,
    only_check_v21: bool,
    exclude_for_v21: bool,
) -> FilterBit {
    FilterBit {
        pos,
        prop,
        only_check_v21,
        exclude_for_v21,
    }
}

const FILTER_BITS: [FilterBit; 12] = [
    bit(1, "FN", true, false),
    bit(3, "PHOTO", false, false),
    bit(4, "BDAY", false, false),
    bit(5, "ADR", false, false),
    bit(8, "EMAIL", false, false),
    bit(12, "TITLE", false, false),
    bit(16, "ORG", false, false),
    bit(17, "NOTE", false, false),
    bit(19, "SOUND", false, false),
    bit(20, "URL", false, false),
    bit(23, "NICKNAME", false, true),
    bit(28, CALL_DATETIME, false, false),
];

const SELECTOR_BITS: [(u8, &str); 15] = [
    (0, "VERSION"),
    (1, "FN"),
    (2, "N"),
    (3, "PHOTO"),
    (4, "BDAY"),
    (5, "ADR"),
    (6, "LABEL"),
    (7, "TEL"),
    (8, "EMAIL"),
    (12, "TITLE"),
    (16, "ORG"),
    (17, "NOTE"),
    (20, "URL"),
    (23, "NICKNAME"),
    (28, CALL_DATETIME),
];

const CALL_DATETIME: &str = "X-IRMC-CALL-DATETIME";

fn is_set(mask: u64, pos: u8) -> bool {
    (mask >> pos) & 1 != 0
}

/// Property name of a vCard content line: everything before the first `;` or `:`.
fn property_name(line: &str) -> &str {
    line.split([';', ':']).next().unwrap_or("")
}

/// Lines that continue the previous property.
fn is_continuation(line: &str) -> bool {
    line.starts_with(|c: char| c.is_whitespace()) || line.starts_with('=')
}

/// Property filter built from a non-zero property selector mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VCardFilter {
    mask: u64,
}

impl VCardFilter {
    pub fn new(mask: u64) -> Self {
        Self { mask }
    }

    /// `None` when the mask is zero, which means "send everything".
    pub fn from_selector(mask: u64) -> Option<Self> {
        (mask != 0).then(|| Self::new(mask))
    }

    fn includes(&self, bit: &FilterBit, version: VCardVersion) -> bool {
        if version == VCardVersion::V30 && bit.only_check_v21 {
            return true;
        }
        if version == VCardVersion::V21 && bit.exclude_for_v21 {
            return false;
        }
        is_set(self.mask, bit.pos)
    }

    /// Whether PHOTO survives this filter. Composers skip image encoding otherwise.
    pub fn includes_photo(&self) -> bool {
        FILTER_BITS
            .iter()
            .find(|b| b.prop == "PHOTO")
            .map(|b| self.includes(b, VCardVersion::V30))
            .unwrap_or(true)
    }

    fn property_included(&self, prop: &str, version: VCardVersion) -> bool {
        if let Some(bit) = FILTER_BITS.iter().find(|b| b.prop == prop) {
            return self.includes(bit, version);
        }
        // No filter bits exist for IM, SIP and similar extensions.
        !prop.starts_with("X-")
    }

    /// Drop the lines of every property this filter excludes.
    pub fn apply(&self, vcard: &str, version: VCardVersion) -> String {
        let mut out = String::with_capacity(vcard.len());
        let mut included = false;
        for line in vcard.split('\n').filter(|l| !l.is_empty()) {
            if !is_continuation(line) {
                included = self.property_included(property_name(line), version);
            }
            if included {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

/// Remove dialling punctuation from TEL values and drop blank lines.
pub fn strip_telephone_number(vcard: &str) -> String {
    let mut out = String::with_capacity(vcard.len());
    for line in vcard.split('\n') {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((prop, value)) if line.starts_with("TEL") => {
                out.push_str(prop);
                out.push(':');
                out.extend(value.chars().filter(|c| !matches!(c, '-' | '(' | ')' | ' ')));
            }
            _ => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

/// vCard selector: which properties a card must carry to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VCardSelector {
    mask: u64,
    operator: SelectorOperator,
}

impl VCardSelector {
    pub fn new(mask: u64, operator: SelectorOperator) -> Self {
        Self { mask, operator }
    }

    /// `None` when the mask is zero, which selects every card.
    pub fn from_mask(mask: u64, operator: SelectorOperator) -> Option<Self> {
        (mask != 0).then(|| Self::new(mask, operator))
    }

    fn has_property(vcard: &str, prop: &str) -> bool {
        vcard
            .split('\n')
            .filter(|l| !l.is_empty() && !is_continuation(l))
            .any(|l| property_name(l.trim_end_matches('\r')) == prop)
    }

    pub fn matches(&self, vcard: &str) -> bool {
        let mut selected = SELECTOR_BITS
            .iter()
            .filter(|(pos, _)| is_set(self.mask, *pos))
            .peekable();
        if selected.peek().is_none() {
            return true;
        }
        match self.operator {
            SelectorOperator::Or => selected.any(|(_, prop)| Self::has_property(vcard, prop)),
            SelectorOperator::And => selected.all(|(_, prop)| Self::has_property(vcard, prop)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = "BEGIN:VCARD\r\nVERSION:2.1\r\nFN:Alice Smith\r\nN:Smith;Alice;;;\r\nNICKNAME:Al\r\nTEL;TYPE=CELL:+1 (555) 010-2000\r\nEMAIL:alice@example.com\r\nNOTE:first line\r\n second line\r\nX-JABBER:alice@im\r\nX-IRMC-CALL-DATETIME;MISSED:20240102T030405\r\nEND:VCARD\r\n";

    const FN: u64 = 1 << 1;
    const N: u64 = 1 << 2;
    const TEL: u64 = 1 << 7;
    const EMAIL: u64 = 1 << 8;
    const NOTE: u64 = 1 << 17;
    const NICKNAME: u64 = 1 << 23;
    const DATETIME: u64 = 1 << 28;

    #[test]
    fn test_filter_keeps_unfiltered_properties() {
        let out = VCardFilter::new(EMAIL).apply(CARD, VCardVersion::V21);
        assert!(out.contains("BEGIN:VCARD"));
        assert!(out.contains("N:Smith"));
        assert!(out.contains("TEL;TYPE=CELL"));
        assert!(out.contains("EMAIL:alice@example.com"));
        assert!(!out.contains("FN:"));
        assert!(!out.contains("NOTE:"));
        assert!(!out.contains("second line"));
        assert!(!out.contains("X-JABBER"));
        assert!(!out.contains("X-IRMC-CALL-DATETIME"));
        assert!(out.ends_with("END:VCARD\r\n"));
    }

    #[test]
    fn test_filter_continuation_follows_property() {
        let out = VCardFilter::new(NOTE).apply(CARD, VCardVersion::V21);
        assert!(out.contains("NOTE:first line\r\n second line\r\n"));
    }

    #[test]
    fn test_filter_version_exceptions() {
        // FN is only filtered for 2.1 cards.
        let out = VCardFilter::new(EMAIL).apply(CARD, VCardVersion::V30);
        assert!(out.contains("FN:Alice Smith"));

        // NICKNAME never goes out in 2.1.
        let out = VCardFilter::new(NICKNAME).apply(CARD, VCardVersion::V21);
        assert!(!out.contains("NICKNAME"));
        let out = VCardFilter::new(NICKNAME).apply(CARD, VCardVersion::V30);
        assert!(out.contains("NICKNAME:Al"));
    }

    #[test]
    fn test_filter_call_datetime_bit() {
        let out = VCardFilter::new(DATETIME).apply(CARD, VCardVersion::V21);
        assert!(out.contains("X-IRMC-CALL-DATETIME;MISSED:20240102T030405"));
        assert!(!out.contains("X-JABBER"));
    }

    #[test]
    fn test_filter_is_idempotent() {
        for mask in [EMAIL, FN | NOTE, NICKNAME | DATETIME, u64::MAX] {
            for version in [VCardVersion::V21, VCardVersion::V30] {
                let filter = VCardFilter::new(mask);
                let once = filter.apply(CARD, version);
                assert_eq!(filter.apply(&once, version), once);
            }
        }
    }

    #[test]
    fn test_zero_mask_means_no_filter() {
        assert!(VCardFilter::from_selector(0).is_none());
        assert!(VCardFilter::from_selector(EMAIL).is_some());
    }

    #[test]
    fn test_photo_flag() {
        assert!(VCardFilter::new(1 << 3).includes_photo());
        assert!(!VCardFilter::new(EMAIL).includes_photo());
    }

    #[test]
    fn test_strip_telephone_number() {
        let out = strip_telephone_number(CARD);
        assert!(out.contains("TEL;TYPE=CELL:+15550102000\r\n"));
        assert!(out.contains("FN:Alice Smith"));

        let sparse = "BEGIN:VCARD\n\nTEL:1-2\n\nEND:VCARD\n";
        assert_eq!(strip_telephone_number(sparse), "BEGIN:VCARD\nTEL:12\nEND:VCARD\n");
    }

    #[test]
    fn test_selector_or() {
        let selector = VCardSelector::new(EMAIL | (1 << 20), SelectorOperator::Or);
        assert!(selector.matches(CARD));
        let selector = VCardSelector::new(1 << 20 | 1 << 16, SelectorOperator::Or);
        assert!(!selector.matches(CARD));
    }

    #[test]
    fn test_selector_and() {
        let selector = VCardSelector::new(FN | N | TEL | EMAIL, SelectorOperator::And);
        assert!(selector.matches(CARD));
        let selector = VCardSelector::new(EMAIL | (1 << 20), SelectorOperator::And);
        assert!(!selector.matches(CARD));
    }

    #[test]
    fn test_selector_ignores_continuation_lines() {
        let card = "BEGIN:VCARD\nNOTE:x\n URL:not-a-property\nEND:VCARD\n";
        let selector = VCardSelector::new(1 << 20, SelectorOperator::Or);
        assert!(!selector.matches(card));
    }

    #[test]
    fn test_selector_zero_mask_matches_everything() {
        assert!(VCardSelector::from_mask(0, SelectorOperator::And).is_none());
        let unknown_bits_only = VCardSelector::new(1 << 40, SelectorOperator::And);
        assert!(unknown_bits_only.matches("BEGIN:VCARD\nEND:VCARD\n"));
    }
}
