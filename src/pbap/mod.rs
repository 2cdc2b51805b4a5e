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

//! Phone Book Access Profile request handling.

mod address;
pub mod app_params;
mod dispatcher;
mod filter;
mod listing;
mod selector;
mod version;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use address::{
    is_legal_path, resolve_address, set_path, ContentAddress, ContentType, RequestType,
    CCH_PATH, ICH_PATH, MCH_PATH, OCH_PATH, PB_PATH, TELECOM_PATH, TYPE_LISTING,
    TYPE_PHONEBOOK, TYPE_VCARD,
};
pub use app_params::{
    RequestParameters, ResponseParameters, SearchAttribute, SelectorOperator, SortOrder,
    VCardVersion,
};
pub use dispatcher::{CollectedResponse, GetResponder, ObexDispatcher, PBAP_TARGET};
pub use filter::{strip_telephone_number, VCardFilter, VCardSelector};
pub use listing::{build_listing_xml, ListingEntry};
pub use selector::{ContentSelector, PullOptions, CALL_LOG_BATCH_LIMIT};
pub use version::{VersionSnapshot, VersionState};

/// Cancellation flag shared between a running GET and the connection task.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
