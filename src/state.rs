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

//! Application state management.

use bluer::Address;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Externally visible status of one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
        }
    }
}

/// Shared application state.
#[derive(Debug, Default)]
pub struct AppState {
    /// Status of every peer that is not disconnected.
    peers: RwLock<HashMap<Address, ConnectionStatus>>,

    /// Most recent connection error, for diagnostics.
    last_error: RwLock<Option<String>>,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, peer: Address, status: ConnectionStatus) {
        let mut peers = self.peers.write();
        if status == ConnectionStatus::Disconnected {
            peers.remove(&peer);
        } else {
            peers.insert(peer, status);
        }
    }

    pub fn get_status(&self, peer: Address) -> ConnectionStatus {
        self.peers
            .read()
            .get(&peer)
            .copied()
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    /// Peers with an authorized session.
    pub fn connected_peers(&self) -> Vec<Address> {
        self.peers
            .read()
            .iter()
            .filter(|(_, status)| **status == ConnectionStatus::Connected)
            .map(|(peer, _)| *peer)
            .collect()
    }

    pub fn set_error(&self, error: String) {
        *self.last_error.write() = Some(error);
    }

    pub fn get_last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tracking() {
        let state = AppState::new();
        let peer = Address::new([1, 2, 3, 4, 5, 6]);
        assert_eq!(state.get_status(peer), ConnectionStatus::Disconnected);

        state.set_status(peer, ConnectionStatus::Connecting);
        assert_eq!(state.get_status(peer), ConnectionStatus::Connecting);
        assert!(state.connected_peers().is_empty());

        state.set_status(peer, ConnectionStatus::Connected);
        assert_eq!(state.connected_peers(), vec![peer]);

        state.set_status(peer, ConnectionStatus::Disconnected);
        assert_eq!(state.get_status(peer), ConnectionStatus::Disconnected);
        assert!(state.connected_peers().is_empty());
    }
}
