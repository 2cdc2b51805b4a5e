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

//! OBEX authentication challenge/response.

use md5::{Digest, Md5};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// How long a challenge waits for a session key.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Tags inside the AuthChallenge / AuthResponse headers.
mod tag {
    pub const NONCE: u8 = 0x00;
    pub const REQUEST_DIGEST: u8 = 0x00;
    pub const RESPONSE_NONCE: u8 = 0x02;
}

/// Credentials built from a session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub session_key: String,
}

/// Waits for a session key while an OBEX challenge is pending.
///
/// At most one challenge is outstanding. A second `challenge()` replaces
/// the first, which then resolves to no credentials.
#[derive(Debug)]
pub struct ObexAuthenticator {
    pending: Mutex<Option<oneshot::Sender<Option<String>>>>,
    timeout: Duration,
}

impl Default for ObexAuthenticator {
    fn default() -> Self {
        Self::with_timeout(AUTH_TIMEOUT)
    }
}

impl ObexAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(None),
            timeout,
        }
    }

    /// Wait until a key is provided, the challenge is cancelled, or the
    /// timeout elapses. An empty or whitespace key yields `None`.
    pub async fn challenge(&self) -> Option<Credentials> {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(tx);
        info!("OBEX authentication challenge pending");

        let key = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(key)) => key,
            Ok(Err(_)) => None,
            Err(_) => {
                warn!("OBEX authentication timed out");
                self.pending.lock().take();
                None
            }
        };

        key.filter(|k| !k.trim().is_empty())
            .map(|session_key| Credentials { session_key })
    }

    /// Resolve the pending challenge with a session key.
    pub fn provide_key(&self, key: String) -> bool {
        match self.pending.lock().take() {
            Some(tx) => {
                debug!("Session key delivered");
                tx.send(Some(key)).is_ok()
            }
            None => false,
        }
    }

    /// Resolve the pending challenge without credentials.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(tx) => {
                info!("OBEX authentication cancelled");
                tx.send(None).is_ok()
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

/// Nonce carried in an AuthChallenge header value, if any.
pub fn challenge_nonce(challenge: &[u8]) -> Option<&[u8]> {
    let mut rest = challenge;
    while rest.len() >= 2 {
        let (tag, len) = (rest[0], rest[1] as usize);
        let value = rest.get(2..2 + len)?;
        if tag == tag::NONCE {
            return Some(value);
        }
        rest = &rest[2 + len..];
    }
    None
}

/// AuthResponse header value answering `nonce` with `credentials`.
///
/// The digest is MD5 over the nonce, a colon and the session key.
pub fn auth_response(nonce: &[u8], credentials: &Credentials) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(nonce);
    hasher.update(b":");
    hasher.update(credentials.session_key.as_bytes());
    let digest = hasher.finalize();

    let mut out = Vec::with_capacity(4 + digest.len() + nonce.len());
    out.push(tag::REQUEST_DIGEST);
    out.push(digest.len() as u8);
    out.extend_from_slice(&digest);
    out.push(tag::RESPONSE_NONCE);
    out.push(nonce.len() as u8);
    out.extend_from_slice(nonce);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_key_resolves_challenge() {
        let auth = Arc::new(ObexAuthenticator::new());
        let waiter = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.challenge().await })
        };
        while !auth.is_pending() {
            tokio::task::yield_now().await;
        }
        assert!(auth.provide_key("1234".into()));
        assert_eq!(
            waiter.await.unwrap(),
            Some(Credentials {
                session_key: "1234".into()
            })
        );
        assert!(!auth.is_pending());
    }

    #[tokio::test]
    async fn test_blank_key_is_no_credentials() {
        let auth = Arc::new(ObexAuthenticator::new());
        let waiter = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.challenge().await })
        };
        while !auth.is_pending() {
            tokio::task::yield_now().await;
        }
        auth.provide_key("   ".into());
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancel_resolves_challenge() {
        let auth = Arc::new(ObexAuthenticator::new());
        let waiter = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.challenge().await })
        };
        while !auth.is_pending() {
            tokio::task::yield_now().await;
        }
        assert!(auth.cancel());
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_challenge() {
        let auth = ObexAuthenticator::new();
        assert_eq!(auth.challenge().await, None);
        assert!(!auth.is_pending());
        assert!(!auth.provide_key("late".into()));
    }

    #[test]
    fn test_no_pending_challenge() {
        let auth = ObexAuthenticator::new();
        assert!(!auth.cancel());
        assert!(!auth.provide_key("1234".into()));
    }

    #[test]
    fn test_challenge_nonce() {
        let mut challenge = vec![0x01, 0x01, 0x00];
        challenge.extend_from_slice(&[0x00, 0x04, 1, 2, 3, 4]);
        assert_eq!(challenge_nonce(&challenge), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(challenge_nonce(&[0x00, 0x10, 1]), None);
        assert_eq!(challenge_nonce(&[]), None);
    }

    #[test]
    fn test_auth_response_layout() {
        let nonce = [7u8; 16];
        let creds = Credentials {
            session_key: "0000".into(),
        };
        let response = auth_response(&nonce, &creds);
        assert_eq!(response.len(), 2 + 16 + 2 + 16);
        assert_eq!(response[0], 0x00);
        assert_eq!(response[1], 16);
        assert_eq!(response[18], 0x02);
        assert_eq!(&response[20..], &nonce);

        let mut expected = Md5::new();
        expected.update(nonce);
        expected.update(b":0000");
        assert_eq!(&response[2..18], expected.finalize().as_slice());
    }
}
