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

//! Access consent for connecting peers.

use bluer::{Adapter, Address};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::PbapError;

/// Outcome of a consent prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentDecision {
    Allow,
    Deny,
}

/// Decides whether a peer may read the phonebook.
///
/// Timeouts are enforced by the caller.
pub trait ConsentPrompt: Send + Sync {
    fn request(&self, peer: Address) -> BoxFuture<'static, ConsentDecision>;
}

/// Wait for a consent decision, giving up after `timeout`.
pub async fn decide_within(
    decision: BoxFuture<'static, ConsentDecision>,
    timeout: Duration,
) -> Result<ConsentDecision, PbapError> {
    tokio::time::timeout(timeout, decision)
        .await
        .map_err(|_| PbapError::AuthTimeout)
}

/// Consent from configuration and the BlueZ device database.
pub struct PolicyConsent {
    trusted_devices: HashSet<Address>,
    auto_accept: bool,
    adapter: Option<Adapter>,
}

impl PolicyConsent {
    pub fn new(
        trusted_devices: impl IntoIterator<Item = Address>,
        auto_accept: bool,
        adapter: Option<Adapter>,
    ) -> Self {
        Self {
            trusted_devices: trusted_devices.into_iter().collect(),
            auto_accept,
            adapter,
        }
    }

    fn decide_locally(&self, peer: Address) -> Option<ConsentDecision> {
        if self.auto_accept {
            debug!("Auto-accepting {}", peer);
            return Some(ConsentDecision::Allow);
        }
        if self.trusted_devices.contains(&peer) {
            debug!("{} is in trusted_devices", peer);
            return Some(ConsentDecision::Allow);
        }
        None
    }
}

impl ConsentPrompt for PolicyConsent {
    fn request(&self, peer: Address) -> BoxFuture<'static, ConsentDecision> {
        if let Some(decision) = self.decide_locally(peer) {
            return futures::future::ready(decision).boxed();
        }

        let Some(adapter) = self.adapter.clone() else {
            info!("No adapter to consult, denying {}", peer);
            return futures::future::ready(ConsentDecision::Deny).boxed();
        };

        async move {
            let device = match adapter.device(peer) {
                Ok(device) => device,
                Err(e) => {
                    warn!("Unknown device {}: {}", peer, e);
                    return ConsentDecision::Deny;
                }
            };
            let paired = device.is_paired().await.unwrap_or(false);
            let trusted = device.is_trusted().await.unwrap_or(false);
            info!("Device {} paired={} trusted={}", peer, paired, trusted);
            if paired && trusted {
                ConsentDecision::Allow
            } else {
                ConsentDecision::Deny
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(last: u8) -> Address {
        Address::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
    }

    #[tokio::test]
    async fn test_trusted_device_allowed() {
        let consent = PolicyConsent::new([peer(1)], false, None);
        assert_eq!(consent.request(peer(1)).await, ConsentDecision::Allow);
        assert_eq!(consent.request(peer(2)).await, ConsentDecision::Deny);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_prompt_times_out() {
        let pending = futures::future::pending::<ConsentDecision>().boxed();
        let result = decide_within(pending, Duration::from_secs(30)).await;
        assert!(matches!(result, Err(PbapError::AuthTimeout)));

        let answered = async { ConsentDecision::Deny }.boxed();
        let result = decide_within(answered, Duration::from_secs(30)).await;
        assert_eq!(result.unwrap(), ConsentDecision::Deny);
    }

    #[tokio::test]
    async fn test_auto_accept() {
        let consent = PolicyConsent::new([], true, None);
        assert_eq!(consent.request(peer(9)).await, ConsentDecision::Allow);
    }
}
