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

//! Folder version counters and database identifier.
//!
//! One `VersionState` is shared by every session. Change listeners bump
//! the counters; response builders read them. All three values live behind
//! a single lock so readers never see a torn combination.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::app_params::{
    RequestParameters, ResponseParameters, FEATURE_DATABASE_IDENTIFIER,
    FEATURE_FOLDER_VERSION_COUNTER,
};
use super::ContentType;
use crate::storage::{CallKind, CallLogStore, CounterFile};

/// Consistent copy of the version state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub primary: i64,
    pub secondary: i64,
    pub database_identifier: i64,
    /// Milliseconds since the epoch of the last call-history fetch.
    #[serde(default)]
    pub last_call_log_fetch: i64,
}

impl VersionSnapshot {
    fn fresh() -> Self {
        Self {
            primary: 0,
            secondary: 0,
            database_identifier: now_millis(),
            last_call_log_fetch: 0,
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Process-wide version tracker.
#[derive(Debug)]
pub struct VersionState {
    inner: RwLock<VersionSnapshot>,
}

impl Default for VersionState {
    fn default() -> Self {
        Self::from_snapshot(VersionSnapshot::fresh())
    }
}

impl VersionState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn from_snapshot(snapshot: VersionSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Restore the state saved by `persist_to`, or start fresh.
    pub fn load_from(file: &CounterFile) -> anyhow::Result<Self> {
        let state = match file.load()? {
            Some(snapshot) => {
                info!(
                    "Loaded version counters primary={} secondary={}",
                    snapshot.primary, snapshot.secondary
                );
                Self::from_snapshot(snapshot)
            }
            None => Self::default(),
        };
        Ok(state)
    }

    pub fn persist_to(&self, file: &CounterFile) -> anyhow::Result<()> {
        file.save(&self.snapshot())
    }

    pub fn snapshot(&self) -> VersionSnapshot {
        *self.inner.read()
    }

    /// Replace the database identifier with one derived from the current time.
    ///
    /// Counters are left as they are.
    pub fn rollover(&self) {
        let mut state = self.inner.write();
        Self::rollover_locked(&mut state);
    }

    fn rollover_locked(state: &mut VersionSnapshot) {
        let mut identifier = now_millis();
        if identifier == state.database_identifier {
            identifier += 1;
        }
        state.database_identifier = identifier;
        info!("Database identifier rolled over to {:016x}", identifier);
    }

    /// Record a phonebook change.
    ///
    /// `primary` changes for any modification, `secondary` only for the
    /// properties that matter to listings (names, numbers, emails...).
    /// A counter that goes negative restarts at zero and forces a rollover.
    pub fn record_change(&self, primary: bool, secondary: bool) {
        let mut state = self.inner.write();
        let mut overflowed = false;
        if primary {
            state.primary = state.primary.wrapping_add(1);
            if state.primary < 0 {
                state.primary = 0;
                overflowed = true;
            }
        }
        if secondary {
            state.secondary = state.secondary.wrapping_add(1);
            if state.secondary < 0 {
                state.secondary = 0;
                overflowed = true;
            }
        }
        if overflowed {
            Self::rollover_locked(&mut state);
        }
        debug!(
            "Version counters now primary={} secondary={}",
            state.primary, state.secondary
        );
    }

    /// Remember when call history was last handed to a peer.
    pub fn mark_call_log_fetched(&self, at: i64) {
        self.inner.write().last_call_log_fetch = at;
    }

    /// Headers for a size-only response, after the size itself.
    pub fn on_size_only_response(
        &self,
        content: ContentType,
        peer: &RequestParameters,
        calls: &dyn CallLogStore,
        out: &mut ResponseParameters,
    ) -> anyhow::Result<()> {
        self.append_database_identifier(peer, out);
        match content {
            ContentType::Phonebook => self.on_phonebook_headers(peer, out),
            other => self.on_call_history_headers(other, peer, calls, out)?,
        }
        Ok(())
    }

    /// Folder version counters for phonebook content.
    pub fn on_phonebook_headers(&self, peer: &RequestParameters, out: &mut ResponseParameters) {
        if !peer.supports(FEATURE_FOLDER_VERSION_COUNTER) {
            return;
        }
        let snapshot = self.snapshot();
        out.primary_version_counter(snapshot.primary)
            .secondary_version_counter(snapshot.secondary);
    }

    /// Folder version counter for call-history content: the number of
    /// calls of that kind newer than the last fetch.
    pub fn on_call_history_headers(
        &self,
        content: ContentType,
        peer: &RequestParameters,
        calls: &dyn CallLogStore,
        out: &mut ResponseParameters,
    ) -> anyhow::Result<()> {
        if !peer.supports(FEATURE_FOLDER_VERSION_COUNTER) {
            return Ok(());
        }
        let since = self.snapshot().last_call_log_fetch;
        let changed = calls.count_since(call_kind(content), since)?;
        out.primary_version_counter(changed as i64);
        Ok(())
    }

    pub fn append_database_identifier(
        &self,
        peer: &RequestParameters,
        out: &mut ResponseParameters,
    ) {
        if peer.supports(FEATURE_DATABASE_IDENTIFIER) {
            out.database_identifier(self.snapshot().database_identifier);
        }
    }
}

/// Call-log kind of a call-history content type; `None` for combined.
pub fn call_kind(content: ContentType) -> Option<CallKind> {
    match content {
        ContentType::IncomingCalls => Some(CallKind::Incoming),
        ContentType::OutgoingCalls => Some(CallKind::Outgoing),
        ContentType::MissedCalls => Some(CallKind::Missed),
        ContentType::Phonebook | ContentType::CombinedCalls => None,
    }
}
