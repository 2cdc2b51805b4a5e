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

//! Content selection: which entries a request addresses and how they are rendered.
//!
//! Handles are external positions. Phonebook handle 0 is the owner card and
//! handle `k` is the `k-1`th contact in the requested order. Call-history
//! handles start at 1, most recent call first.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::app_params::{SearchAttribute, VCardVersion};
use super::filter::{strip_telephone_number, VCardFilter, VCardSelector};
use super::listing::ListingEntry;
use super::version::call_kind;
use super::{AbortFlag, ContentType};
use crate::error::PbapError;
use crate::storage::{
    numbers_match, CallLogStore, CallRecord, ComposeOptions, ContactOrder, ContactStore,
    OwnerCard, VCardComposer,
};

/// Most call-history entries a single range pull may return.
pub const CALL_LOG_BATCH_LIMIT: usize = 50;

/// Rendering options of one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PullOptions {
    pub version: VCardVersion,
    pub filter: Option<VCardFilter>,
    pub selector: Option<VCardSelector>,
}

impl PullOptions {
    /// Same options with the vCard selector dropped.
    pub fn unselected(&self) -> Self {
        Self {
            selector: None,
            ..*self
        }
    }
}

/// Name shown for a call in listings.
fn call_display_name(call: &CallRecord) -> &str {
    if call.private {
        return "";
    }
    call.cached_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(&call.number)
}

pub struct ContentSelector {
    contacts: Arc<dyn ContactStore>,
    calls: Arc<dyn CallLogStore>,
    composer: Arc<dyn VCardComposer>,
    owner: OwnerCard,
    include_photos: bool,
}

impl ContentSelector {
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        calls: Arc<dyn CallLogStore>,
        composer: Arc<dyn VCardComposer>,
        owner: OwnerCard,
        include_photos: bool,
    ) -> Self {
        Self {
            contacts,
            calls,
            composer,
            owner,
            include_photos,
        }
    }

    pub fn calls(&self) -> &dyn CallLogStore {
        self.calls.as_ref()
    }

    fn compose_options(&self, opts: &PullOptions) -> ComposeOptions {
        ComposeOptions {
            version: opts.version,
            include_photo: self.include_photos
                && opts.filter.map_or(true, |f| f.includes_photo()),
        }
    }

    /// Apply the property filter. Phone numbers lose their punctuation when a filter is set.
    fn filtered(&self, card: String, opts: &PullOptions) -> String {
        match opts.filter {
            Some(filter) => strip_telephone_number(&filter.apply(&card, opts.version)),
            None => card,
        }
    }

    /// Filtered card, or `None` when the vCard selector rejects it.
    fn selected(&self, card: String, opts: &PullOptions) -> Option<String> {
        let card = self.filtered(card, opts);
        match opts.selector {
            Some(selector) if !selector.matches(&card) => None,
            _ => Some(card),
        }
    }

    fn owner_card(&self, opts: &PullOptions) -> String {
        let card = self
            .composer
            .compose_owner(&self.owner, &self.compose_options(opts));
        self.filtered(card, opts)
    }

    fn call_records(&self, content: ContentType) -> anyhow::Result<Vec<CallRecord>> {
        self.calls.list(call_kind(content))
    }

    /// Number of addressable entries, the owner card included.
    ///
    /// With an active vCard selector only passing entries are counted. The
    /// owner card always counts.
    pub fn size(&self, content: ContentType, opts: &PullOptions) -> anyhow::Result<usize> {
        let Some(selector) = opts.selector else {
            return Ok(match content {
                ContentType::Phonebook => self.contacts.count()? + 1,
                other => self.calls.count(call_kind(other))?,
            });
        };

        let compose = self.compose_options(opts);
        let passing = match content {
            ContentType::Phonebook => {
                1 + self
                    .contacts
                    .list(ContactOrder::Indexed)?
                    .iter()
                    .map(|c| self.filtered(self.composer.compose_contact(c, &compose), opts))
                    .filter(|card| selector.matches(card))
                    .count()
            }
            other => self
                .call_records(other)?
                .iter()
                .map(|c| self.filtered(self.composer.compose_call(c, &compose), opts))
                .filter(|card| selector.matches(card))
                .count(),
        };
        debug!("{} entries of {:?} pass the vCard selector", passing, content);
        Ok(passing)
    }

    /// New missed calls for the response header.
    pub fn new_missed_calls(&self) -> anyhow::Result<usize> {
        self.calls.new_missed_count()
    }

    /// Phonebook listing in `order`, starting at handle `offset`.
    ///
    /// Name searches are a case-insensitive prefix match. Number searches
    /// match any stored number of a contact. An empty search value matches
    /// every entry.
    pub fn list_phonebook(
        &self,
        order: ContactOrder,
        attribute: SearchAttribute,
        value: &str,
        offset: usize,
        max: usize,
        opts: &PullOptions,
    ) -> anyhow::Result<Vec<ListingEntry>> {
        let contacts = self.contacts.list(order)?;
        let needle = value.trim().to_lowercase();

        let by_number: Option<HashSet<i64>> =
            if attribute == SearchAttribute::Number && !needle.is_empty() {
                Some(self.contacts.by_number(value.trim())?.into_iter().collect())
            } else {
                None
            };

        let name_matches =
            |name: &str| needle.is_empty() || name.trim().to_lowercase().starts_with(&needle);

        let compose = self.compose_options(opts);
        let mut entries = Vec::new();
        let total = contacts.len() + 1;
        for handle in offset..total {
            if entries.len() >= max {
                break;
            }
            let entry = if handle == 0 {
                let hit = match &by_number {
                    Some(_) => numbers_match(&self.owner.number, value),
                    None => name_matches(&self.owner.name),
                };
                hit.then(|| ListingEntry::new(0, self.owner.name.clone()))
            } else {
                let contact = &contacts[handle - 1];
                let hit = match &by_number {
                    Some(ids) => ids.contains(&contact.id),
                    None => name_matches(&contact.display_name),
                };
                let passes = hit
                    && (opts.selector.is_none()
                        || self
                            .selected(self.composer.compose_contact(contact, &compose), opts)
                            .is_some());
                passes.then(|| ListingEntry::new(handle, contact.display_name.clone()))
            };
            entries.extend(entry);
        }

        debug!(
            "Phonebook listing: {} of {} entries from offset {}",
            entries.len(),
            total,
            offset
        );
        Ok(entries)
    }

    /// Call-history listing starting at position `offset`, handles from `offset + 1`.
    pub fn list_call_history(
        &self,
        content: ContentType,
        offset: usize,
        max: usize,
        opts: &PullOptions,
    ) -> anyhow::Result<Vec<ListingEntry>> {
        let calls = self.call_records(content)?;
        let end = offset.saturating_add(max.min(calls.len())).min(calls.len());
        let compose = self.compose_options(opts);

        let mut entries = Vec::new();
        for (j, call) in calls.iter().enumerate().take(end).skip(offset) {
            if opts.selector.is_some()
                && self
                    .selected(self.composer.compose_call(call, &compose), opts)
                    .is_none()
            {
                continue;
            }
            entries.push(ListingEntry::new(j + 1, call_display_name(call)));
        }
        Ok(entries)
    }

    /// One vCard by handle. The vCard selector does not apply.
    pub fn pull_single(
        &self,
        content: ContentType,
        handle: usize,
        order: ContactOrder,
        opts: &PullOptions,
    ) -> Result<String, PbapError> {
        let opts = opts.unselected();
        let compose = self.compose_options(&opts);
        match content {
            ContentType::Phonebook => {
                if handle == 0 {
                    return Ok(self.owner_card(&opts));
                }
                let contacts = self.contacts.list(order)?;
                let contact = contacts
                    .get(handle - 1)
                    .ok_or_else(|| PbapError::NotFound(format!("no contact {}.vcf", handle)))?;
                Ok(self.filtered(self.composer.compose_contact(contact, &compose), &opts))
            }
            other => {
                if handle == 0 {
                    return Err(PbapError::NotFound(
                        "call history handles start at 1".to_string(),
                    ));
                }
                let calls = self.call_records(other)?;
                let call = calls
                    .get(handle - 1)
                    .ok_or_else(|| PbapError::NotFound(format!("no call {}.vcf", handle)))?;
                Ok(self.filtered(self.composer.compose_call(call, &compose), &opts))
            }
        }
    }

    /// Emit the vCards for handles `start..=end`.
    ///
    /// Entries rejected by the vCard selector are skipped. The abort flag is
    /// checked before each entry; a raised flag ends the pull after the
    /// entry already written. Returns the number of entries emitted.
    pub fn pull_range(
        &self,
        content: ContentType,
        start: usize,
        end: usize,
        order: ContactOrder,
        opts: &PullOptions,
        abort: &AbortFlag,
        emit: &mut dyn FnMut(&str) -> Result<(), PbapError>,
    ) -> Result<usize, PbapError> {
        let compose = self.compose_options(opts);
        let mut emitted = 0;

        let cards: Box<dyn Iterator<Item = (usize, String)> + '_> = match content {
            ContentType::Phonebook => {
                let contacts = self.contacts.list(order)?;
                Box::new((start..=end).filter_map(move |handle| {
                    if handle == 0 {
                        return Some((0, self.owner_card(opts)));
                    }
                    let contact = contacts.get(handle - 1)?;
                    self.selected(self.composer.compose_contact(contact, &compose), opts)
                        .map(|card| (handle, card))
                }))
            }
            other => {
                let calls = self.call_records(other)?;
                let start = start.max(1);
                Box::new((start..=end).filter_map(move |handle| {
                    let call = calls.get(handle - 1)?;
                    self.selected(self.composer.compose_call(call, &compose), opts)
                        .map(|card| (handle, card))
                }))
            }
        };

        for (handle, card) in cards {
            if abort.is_raised() {
                info!("Pull of {:?} aborted after {} entries", content, emitted);
                break;
            }
            emit(&card)?;
            emitted += 1;
            debug!("Sent {}.vcf", handle);
        }
        Ok(emitted)
    }
}
