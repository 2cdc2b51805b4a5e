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

//! Plain vCard 2.1/3.0 text composer.

use base64::{engine::general_purpose::STANDARD, Engine};

use super::{CallKind, CallRecord, ComposeOptions, Contact, OwnerCard, VCardComposer};
use crate::pbap::VCardVersion;

const CRLF: &str = "\r\n";
const UNKNOWN_NAME: &str = "Unknown";

/// Default composer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextComposer;

/// Escape a text value.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\r' => {}
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Pause and wait characters become `p` and `w`.
fn dialable(number: &str) -> String {
    number
        .chars()
        .map(|c| match c {
            ',' => 'p',
            ';' => 'w',
            other => other,
        })
        .collect()
}

/// Split a display name into the structured `N` components.
fn structured_name(display_name: &str) -> String {
    match display_name.trim().rsplit_once(' ') {
        Some((given, family)) => format!("{};{};;;", escape(family), escape(given)),
        None => format!("{};;;;", escape(display_name.trim())),
    }
}

fn or_unknown(name: &str) -> &str {
    if name.trim().is_empty() {
        UNKNOWN_NAME
    } else {
        name
    }
}

struct Card {
    text: String,
    version: VCardVersion,
}

impl Card {
    fn begin(version: VCardVersion) -> Self {
        let mut card = Self {
            text: String::new(),
            version,
        };
        card.line("BEGIN:VCARD");
        card.line(&format!("VERSION:{}", version.as_str()));
        card
    }

    fn line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push_str(CRLF);
    }

    fn names(&mut self, display_name: &str) {
        let name = or_unknown(display_name);
        self.line(&format!("N:{}", structured_name(name)));
        self.line(&format!("FN:{}", escape(name)));
    }

    /// Property with an optional type parameter, spelled per version.
    fn typed(&mut self, prop: &str, kind: Option<&str>, value: &str) {
        let line = match (kind, self.version) {
            (None, _) => format!("{}:{}", prop, value),
            (Some(kind), VCardVersion::V21) => format!("{};{}:{}", prop, kind, value),
            (Some(kind), VCardVersion::V30) => format!("{};TYPE={}:{}", prop, kind, value),
        };
        self.line(&line);
    }

    fn optional(&mut self, prop: &str, value: Option<&String>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.line(&format!("{}:{}", prop, escape(value)));
        }
    }

    fn end(mut self) -> String {
        self.line("END:VCARD");
        self.text
    }
}

impl VCardComposer for TextComposer {
    fn compose_contact(&self, contact: &Contact, options: &ComposeOptions) -> String {
        let mut card = Card::begin(options.version);
        card.names(&contact.display_name);
        if let Some(nick) = contact.nickname.as_ref().filter(|n| !n.is_empty()) {
            card.line(&format!("NICKNAME:{}", escape(nick)));
        }
        for phone in &contact.phones {
            card.typed("TEL", Some(phone.kind.as_str()), &dialable(&phone.number));
        }
        for email in &contact.emails {
            card.typed("EMAIL", Some("INTERNET"), email);
        }
        if let Some(address) = contact.address.as_ref().filter(|a| !a.is_empty()) {
            card.typed("ADR", Some("HOME"), &format!(";;{};;;;", escape(address)));
        }
        card.optional("ORG", contact.organization.as_ref());
        card.optional("TITLE", contact.title.as_ref());
        card.optional("BDAY", contact.birthday.as_ref());
        card.optional("URL", contact.url.as_ref());
        card.optional("NOTE", contact.note.as_ref());
        if options.include_photo {
            if let Some(photo) = contact.photo.as_ref().filter(|p| !p.is_empty()) {
                let encoded = STANDARD.encode(photo);
                let line = match options.version {
                    VCardVersion::V21 => format!("PHOTO;ENCODING=BASE64;JPEG:{}", encoded),
                    VCardVersion::V30 => format!("PHOTO;ENCODING=b;TYPE=JPEG:{}", encoded),
                };
                card.line(&line);
            }
        }
        card.end()
    }

    fn compose_call(&self, call: &CallRecord, options: &ComposeOptions) -> String {
        let mut card = Card::begin(options.version);
        let name = if call.private {
            ""
        } else {
            call.cached_name
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(&call.number)
        };
        card.names(name);
        if !call.private && !call.number.is_empty() {
            card.typed("TEL", Some("X-0"), &dialable(&call.number));
        }
        let kind = match call.kind {
            CallKind::Incoming => "RECEIVED",
            CallKind::Outgoing => "DIALED",
            CallKind::Missed => "MISSED",
        };
        card.line(&format!(
            "X-IRMC-CALL-DATETIME;{}:{}",
            kind,
            call.timestamp.format("%Y%m%dT%H%M%S")
        ));
        card.end()
    }

    fn compose_owner(&self, owner: &OwnerCard, options: &ComposeOptions) -> String {
        let mut card = Card::begin(options.version);
        card.names(&owner.name);
        if !owner.number.is_empty() {
            card.typed("TEL", Some("CELL"), &dialable(&owner.number));
        }
        card.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PhoneKind;
    use chrono::{TimeZone, Utc};

    fn options(version: VCardVersion) -> ComposeOptions {
        ComposeOptions {
            version,
            include_photo: false,
        }
    }

    #[test]
    fn test_contact_v21() {
        let contact = Contact::new("Alice Smith")
            .with_phone("555,123;9", PhoneKind::Cell)
            .with_email("alice@example.com");
        let card = TextComposer.compose_contact(&contact, &options(VCardVersion::V21));
        assert_eq!(
            card,
            "BEGIN:VCARD\r\nVERSION:2.1\r\nN:Smith;Alice;;;\r\nFN:Alice Smith\r\n\
             TEL;CELL:555p123w9\r\nEMAIL;INTERNET:alice@example.com\r\nEND:VCARD\r\n"
        );
    }

    #[test]
    fn test_contact_v30_types() {
        let mut contact = Contact::new("Bob").with_phone("1", PhoneKind::Work);
        contact.note = Some("line one\nline two; more".into());
        let card = TextComposer.compose_contact(&contact, &options(VCardVersion::V30));
        assert!(card.contains("VERSION:3.0\r\n"));
        assert!(card.contains("N:Bob;;;;\r\n"));
        assert!(card.contains("TEL;TYPE=WORK:1\r\n"));
        assert!(card.contains("NOTE:line one\\nline two\\; more\r\n"));
    }

    #[test]
    fn test_photo_only_when_requested() {
        let mut contact = Contact::new("Pic");
        contact.photo = Some(vec![0xFF, 0xD8, 0xFF]);
        let without = TextComposer.compose_contact(&contact, &options(VCardVersion::V21));
        assert!(!without.contains("PHOTO"));

        let with = TextComposer.compose_contact(
            &contact,
            &ComposeOptions {
                version: VCardVersion::V21,
                include_photo: true,
            },
        );
        assert!(with.contains("PHOTO;ENCODING=BASE64;JPEG:/9j/\r\n"));
    }

    #[test]
    fn test_call_record() {
        let when = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let call = CallRecord::new("+15550100", CallKind::Missed, when).with_name("Carol");
        let card = TextComposer.compose_call(&call, &options(VCardVersion::V21));
        assert!(card.contains("FN:Carol\r\n"));
        assert!(card.contains("TEL;X-0:+15550100\r\n"));
        assert!(card.contains("X-IRMC-CALL-DATETIME;MISSED:20240102T030405\r\n"));
    }

    #[test]
    fn test_private_call_is_unknown() {
        let mut call = CallRecord::new("", CallKind::Incoming, Utc::now());
        call.private = true;
        let card = TextComposer.compose_call(&call, &options(VCardVersion::V30));
        assert!(card.contains("FN:Unknown\r\n"));
        assert!(!card.contains("TEL"));
        assert!(card.contains("X-IRMC-CALL-DATETIME;RECEIVED:"));
    }

    #[test]
    fn test_owner_card() {
        let owner = OwnerCard {
            name: "My Phone".into(),
            number: "+4912345".into(),
        };
        let card = TextComposer.compose_owner(&owner, &options(VCardVersion::V21));
        assert!(card.contains("FN:My Phone\r\n"));
        assert!(card.contains("TEL;CELL:+4912345\r\n"));
    }
}
