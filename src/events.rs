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

//! Event processing and message dispatch.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::bluetooth::ConnectionEvent;
use crate::session::{SessionMessage, SessionRegistry};
use crate::state::AppState;

/// Process events from Bluetooth connections.
pub struct EventProcessor {
    state: Arc<AppState>,
    registry: Arc<SessionRegistry>,
    session_key: Option<String>,
}

impl EventProcessor {
    /// Create a new event processor.
    pub fn new(state: Arc<AppState>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            state,
            registry,
            session_key: None,
        }
    }

    /// Answer OBEX authentication challenges with `key`.
    pub fn with_session_key(mut self, key: Option<String>) -> Self {
        self.session_key = key;
        self
    }

    /// Process a single event.
    pub async fn process_event(&mut self, event: ConnectionEvent) -> Result<()> {
        match event {
            ConnectionEvent::StateChanged { peer, status } => {
                info!("{}: {}", peer, status.as_str());
                self.state.set_status(peer, status);
            }
            ConnectionEvent::PermissionRequested { peer } => {
                info!("Access requested by {}", peer);
            }
            ConnectionEvent::AuthChallenge { peer } => {
                let message = match &self.session_key {
                    Some(key) => {
                        info!("Answering OBEX challenge from {} with configured key", peer);
                        SessionMessage::SessionKey(key.clone())
                    }
                    None => {
                        warn!("OBEX challenge from {} but no session key configured", peer);
                        SessionMessage::AuthCancelled
                    }
                };
                if !self.registry.send(peer, message).await {
                    warn!("Session for {} is gone", peer);
                }
            }
            ConnectionEvent::Error(e) => {
                error!("Connection error: {}", e);
                self.state.set_error(e);
            }
        }
        Ok(())
    }
}
