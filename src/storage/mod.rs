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

//! Contact, call-log and counter storage.
//!
//! The request handlers only see the traits defined here. `SqlitePhonebook`
//! and `TextComposer` are the implementations the server ships with.

mod composer;
mod counters;
mod sqlite;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::pbap::VCardVersion;

pub use composer::TextComposer;
pub use counters::CounterFile;
pub use sqlite::{numbers_match, SqlitePhonebook};

pub type ContactId = i64;

/// Kind of a stored phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneKind {
    Cell,
    Home,
    Work,
    Other,
}

impl PhoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cell => "CELL",
            Self::Home => "HOME",
            Self::Work => "WORK",
            Self::Other => "VOICE",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "CELL" => Self::Cell,
            "HOME" => Self::Home,
            "WORK" => Self::Work,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumber {
    pub number: String,
    pub kind: PhoneKind,
}

/// One distinct contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub display_name: String,
    pub phones: Vec<PhoneNumber>,
    pub emails: Vec<String>,
    pub organization: Option<String>,
    pub title: Option<String>,
    pub note: Option<String>,
    pub url: Option<String>,
    pub birthday: Option<String>,
    pub nickname: Option<String>,
    pub address: Option<String>,
    pub photo: Option<Vec<u8>>,
}

impl Contact {
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_phone(mut self, number: &str, kind: PhoneKind) -> Self {
        self.phones.push(PhoneNumber {
            number: number.to_string(),
            kind,
        });
        self
    }

    pub fn with_email(mut self, address: &str) -> Self {
        self.emails.push(address.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Incoming,
    Outgoing,
    Missed,
}

impl CallKind {
    /// Value stored in the `calls.kind` column.
    pub fn code(&self) -> i64 {
        match self {
            Self::Incoming => 1,
            Self::Outgoing => 2,
            Self::Missed => 3,
        }
    }

    fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Incoming),
            2 => Some(Self::Outgoing),
            3 => Some(Self::Missed),
            _ => None,
        }
    }
}

/// One call-log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub id: i64,
    pub number: String,
    pub cached_name: Option<String>,
    pub kind: CallKind,
    pub timestamp: DateTime<Utc>,
    pub duration_secs: i64,
    /// Missed call not yet seen by the user.
    pub is_new: bool,
    /// Caller withheld their number.
    pub private: bool,
}

impl CallRecord {
    pub fn new(number: &str, kind: CallKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            number: number.to_string(),
            cached_name: None,
            kind,
            timestamp,
            duration_secs: 0,
            is_new: kind == CallKind::Missed,
            private: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.cached_name = Some(name.to_string());
        self
    }
}

/// Identity of the local phone, sent as phonebook entry 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerCard {
    pub name: String,
    pub number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOrder {
    Indexed,
    Alphabetical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeOptions {
    pub version: VCardVersion,
    pub include_photo: bool,
}

/// Source of phonebook contacts.
pub trait ContactStore: Send + Sync {
    /// Distinct contacts in the requested order.
    fn list(&self, order: ContactOrder) -> Result<Vec<Contact>>;

    /// Ids of contacts with a number matching `number`.
    fn by_number(&self, number: &str) -> Result<Vec<ContactId>>;

    fn count(&self) -> Result<usize>;
}

/// Source of call history. `None` as the kind selects every call.
pub trait CallLogStore: Send + Sync {
    /// Most recent first.
    fn list(&self, kind: Option<CallKind>) -> Result<Vec<CallRecord>>;

    fn count(&self, kind: Option<CallKind>) -> Result<usize>;

    /// Calls of `kind` placed after `since` (milliseconds since the epoch).
    fn count_since(&self, kind: Option<CallKind>, since: i64) -> Result<usize>;

    /// Missed calls still flagged as new.
    fn new_missed_count(&self) -> Result<usize>;
}

/// Turns stored records into vCard text.
pub trait VCardComposer: Send + Sync {
    fn compose_contact(&self, contact: &Contact, options: &ComposeOptions) -> String;

    fn compose_call(&self, call: &CallRecord, options: &ComposeOptions) -> String;

    fn compose_owner(&self, owner: &OwnerCard, options: &ComposeOptions) -> String;
}
