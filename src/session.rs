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

//! Per-peer session lifecycle.
//!
//! `SessionMachine` is a pure state machine: it consumes `SessionMessage`s
//! and returns the `SessionAction`s the connection handler must carry out.
//! Keeping the side effects out of the machine lets the transitions be
//! tested without a socket.

use bluer::Address;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::PbapError;
use crate::state::ConnectionStatus;

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no permission requested yet.
    None,
    /// Waiting for the consent prompt to resolve.
    WaitingForAuth,
    /// Authorized; the OBEX server is running on the socket.
    Connected,
    /// Torn down. Terminal.
    Finished,
}

impl SessionState {
    /// Status reported to the rest of the application.
    pub fn status(&self) -> ConnectionStatus {
        match self {
            SessionState::None | SessionState::Finished => ConnectionStatus::Disconnected,
            SessionState::WaitingForAuth => ConnectionStatus::Connecting,
            SessionState::Connected => ConnectionStatus::Connected,
        }
    }
}

/// Input delivered to a session, serialized through its queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMessage {
    /// Consent granted.
    Authorized,
    /// Consent refused.
    Rejected,
    /// Consent prompt did not resolve in time.
    AuthTimeout,
    /// Peer or transport went away.
    Disconnect,
    /// The transport asked for OBEX authentication.
    AuthChallenge,
    /// Session key entered for a pending challenge.
    SessionKey(String),
    /// Pending challenge dismissed.
    AuthCancelled,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    NotifyStateChanged(ConnectionStatus),
    RequestPermission,
    StartObexServer,
    StartRejectResponder,
    CloseSession,
    RemoveFromRegistry,
    PromptAuthKey,
    DeliverSessionKey(String),
    CancelAuth,
}

/// State machine for one peer connection.
#[derive(Debug)]
pub struct SessionMachine {
    peer: Address,
    state: SessionState,
    reported: ConnectionStatus,
}

impl SessionMachine {
    pub fn new(peer: Address) -> Self {
        Self {
            peer,
            state: SessionState::None,
            reported: ConnectionStatus::Disconnected,
        }
    }

    pub fn peer(&self) -> Address {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    /// Enter `WaitingForAuth` and ask for consent.
    pub fn start(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        self.transition(SessionState::WaitingForAuth, &mut actions);
        actions.push(SessionAction::RequestPermission);
        actions
    }

    /// Feed one message to the machine.
    ///
    /// A message the current state does not accept leaves the state
    /// unchanged and returns `PbapError::StateViolation`; the caller is
    /// expected to tear the session down with `force_finish`.
    pub fn handle(&mut self, message: SessionMessage) -> Result<Vec<SessionAction>, PbapError> {
        debug!("Session {} in {:?} got {:?}", self.peer, self.state, message);
        let mut actions = Vec::new();
        match (self.state, message) {
            (SessionState::Finished, _) => {}
            (SessionState::WaitingForAuth, SessionMessage::Authorized) => {
                self.transition(SessionState::Connected, &mut actions);
                actions.push(SessionAction::StartObexServer);
            }
            (SessionState::WaitingForAuth, SessionMessage::Rejected)
            | (SessionState::WaitingForAuth, SessionMessage::AuthTimeout) => {
                actions.push(SessionAction::StartRejectResponder);
                self.finish(&mut actions);
            }
            (SessionState::WaitingForAuth, SessionMessage::Disconnect)
            | (SessionState::Connected, SessionMessage::Disconnect) => {
                self.finish(&mut actions);
            }
            (SessionState::Connected, SessionMessage::AuthChallenge) => {
                actions.push(SessionAction::PromptAuthKey);
            }
            (SessionState::Connected, SessionMessage::SessionKey(key)) => {
                actions.push(SessionAction::DeliverSessionKey(key));
            }
            (SessionState::Connected, SessionMessage::AuthCancelled) => {
                actions.push(SessionAction::CancelAuth);
            }
            (state, message) => {
                warn!(
                    "Session {}: {:?} is not accepted in {:?}",
                    self.peer, message, state
                );
                return Err(PbapError::StateViolation(format!(
                    "{:?} in state {:?}",
                    message, state
                )));
            }
        }
        Ok(actions)
    }

    /// Finish the session from any started state. Safe to call more than
    /// once. An unstarted machine stays in `None` and only releases its
    /// resources.
    pub fn force_finish(&mut self) -> Vec<SessionAction> {
        match self.state {
            SessionState::Finished => Vec::new(),
            SessionState::None => {
                vec![SessionAction::CloseSession, SessionAction::RemoveFromRegistry]
            }
            SessionState::WaitingForAuth | SessionState::Connected => {
                let mut actions = Vec::new();
                self.finish(&mut actions);
                actions
            }
        }
    }

    fn finish(&mut self, actions: &mut Vec<SessionAction>) {
        self.transition(SessionState::Finished, actions);
        actions.push(SessionAction::CloseSession);
        actions.push(SessionAction::RemoveFromRegistry);
    }

    fn transition(&mut self, next: SessionState, actions: &mut Vec<SessionAction>) {
        let legal = matches!(
            (self.state, next),
            (SessionState::None, SessionState::WaitingForAuth)
                | (SessionState::WaitingForAuth, SessionState::Connected)
                | (SessionState::WaitingForAuth, SessionState::Finished)
                | (SessionState::Connected, SessionState::Finished)
        );
        assert!(
            legal,
            "illegal session transition {:?} -> {:?}",
            self.state, next
        );

        info!("Session {}: {:?} -> {:?}", self.peer, self.state, next);
        self.state = next;

        let status = next.status();
        if status != self.reported {
            self.reported = status;
            actions.push(SessionAction::NotifyStateChanged(status));
        }
    }
}

/// Sending side of a live session's message queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionMessage>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<SessionMessage>) -> Self {
        Self { tx }
    }
}

/// Process-wide map of live sessions, one per peer.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Address, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a session. Returns false if the peer already has one.
    pub fn try_insert(&self, peer: Address, handle: SessionHandle) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&peer) {
            return false;
        }
        sessions.insert(peer, handle);
        true
    }

    pub fn remove(&self, peer: Address) {
        if self.sessions.lock().remove(&peer).is_some() {
            debug!("Session for {} removed from registry", peer);
        }
    }

    pub fn contains(&self, peer: Address) -> bool {
        self.sessions.lock().contains_key(&peer)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a message for a peer's session.
    ///
    /// The registry lock is released before awaiting the queue.
    pub async fn send(&self, peer: Address, message: SessionMessage) -> bool {
        let tx = match self.sessions.lock().get(&peer) {
            Some(handle) => handle.tx.clone(),
            None => return false,
        };
        tx.send(message).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Address {
        Address::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])
    }

    fn started() -> SessionMachine {
        let mut machine = SessionMachine::new(peer());
        machine.start();
        machine
    }

    #[test]
    fn test_start_requests_permission() {
        let mut machine = SessionMachine::new(peer());
        let actions = machine.start();
        assert_eq!(machine.state(), SessionState::WaitingForAuth);
        assert_eq!(
            actions,
            vec![
                SessionAction::NotifyStateChanged(ConnectionStatus::Connecting),
                SessionAction::RequestPermission,
            ]
        );
    }

    #[test]
    fn test_authorized_starts_obex() {
        let mut machine = started();
        let actions = machine.handle(SessionMessage::Authorized).unwrap();
        assert_eq!(machine.state(), SessionState::Connected);
        assert_eq!(
            actions,
            vec![
                SessionAction::NotifyStateChanged(ConnectionStatus::Connected),
                SessionAction::StartObexServer,
            ]
        );
    }

    #[test]
    fn test_rejected_and_timeout_finish() {
        for message in [SessionMessage::Rejected, SessionMessage::AuthTimeout] {
            let mut machine = started();
            let actions = machine.handle(message).unwrap();
            assert!(machine.is_finished());
            assert_eq!(
                actions,
                vec![
                    SessionAction::StartRejectResponder,
                    SessionAction::NotifyStateChanged(ConnectionStatus::Disconnected),
                    SessionAction::CloseSession,
                    SessionAction::RemoveFromRegistry,
                ]
            );
        }
    }

    #[test]
    fn test_messages_before_authorization_are_violations() {
        for message in [
            SessionMessage::AuthChallenge,
            SessionMessage::SessionKey("1234".into()),
            SessionMessage::AuthCancelled,
        ] {
            let mut machine = started();
            let err = machine.handle(message).unwrap_err();
            assert!(matches!(err, PbapError::StateViolation(_)));
            assert_eq!(machine.state(), SessionState::WaitingForAuth);
        }
    }

    #[test]
    fn test_unstarted_session_rejects_messages() {
        let mut machine = SessionMachine::new(peer());
        assert!(machine.handle(SessionMessage::Authorized).is_err());
        assert_eq!(machine.state(), SessionState::None);
    }

    #[test]
    fn test_authorized_twice_is_violation() {
        let mut machine = started();
        machine.handle(SessionMessage::Authorized).unwrap();
        assert!(machine.handle(SessionMessage::Authorized).is_err());
        assert_eq!(machine.state(), SessionState::Connected);
    }

    #[test]
    fn test_auth_sub_protocol_when_connected() {
        let mut machine = started();
        machine.handle(SessionMessage::Authorized).unwrap();
        assert_eq!(
            machine.handle(SessionMessage::AuthChallenge).unwrap(),
            vec![SessionAction::PromptAuthKey]
        );
        assert_eq!(
            machine
                .handle(SessionMessage::SessionKey("0000".into()))
                .unwrap(),
            vec![SessionAction::DeliverSessionKey("0000".into())]
        );
        assert_eq!(
            machine.handle(SessionMessage::AuthCancelled).unwrap(),
            vec![SessionAction::CancelAuth]
        );
        assert_eq!(machine.state(), SessionState::Connected);
    }

    #[test]
    fn test_disconnect_finishes_once() {
        let mut machine = started();
        machine.handle(SessionMessage::Authorized).unwrap();
        let actions = machine.handle(SessionMessage::Disconnect).unwrap();
        assert!(actions.contains(&SessionAction::RemoveFromRegistry));
        assert!(machine.handle(SessionMessage::Disconnect).unwrap().is_empty());
        assert!(machine.force_finish().is_empty());
    }

    #[test]
    fn test_force_finish_from_waiting() {
        let mut machine = started();
        let actions = machine.force_finish();
        assert!(machine.is_finished());
        assert_eq!(
            actions[0],
            SessionAction::NotifyStateChanged(ConnectionStatus::Disconnected)
        );
        assert!(machine.force_finish().is_empty());
    }

    #[test]
    fn test_force_finish_unstarted_does_not_notify() {
        let mut machine = SessionMachine::new(peer());
        let actions = machine.force_finish();
        assert_eq!(
            actions,
            vec![SessionAction::CloseSession, SessionAction::RemoveFromRegistry]
        );
        assert_eq!(machine.state(), SessionState::None);
        assert!(!machine.is_finished());
    }

    #[test]
    #[should_panic(expected = "illegal session transition")]
    fn test_unstarted_machine_cannot_finish() {
        let mut machine = SessionMachine::new(peer());
        let mut actions = Vec::new();
        machine.finish(&mut actions);
    }

    #[tokio::test]
    async fn test_registry_refuses_duplicates() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        assert!(registry.try_insert(peer(), SessionHandle::new(tx.clone())));
        assert!(!registry.try_insert(peer(), SessionHandle::new(tx)));
        assert_eq!(registry.len(), 1);

        assert!(registry.send(peer(), SessionMessage::AuthCancelled).await);
        assert_eq!(rx.recv().await, Some(SessionMessage::AuthCancelled));

        registry.remove(peer());
        assert!(registry.is_empty());
        assert!(!registry.send(peer(), SessionMessage::Disconnect).await);
    }
}
