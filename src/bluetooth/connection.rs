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

//! Individual Bluetooth connection handler.

use anyhow::Result;
use bluer::Address;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::auth::{auth_response, challenge_nonce, ObexAuthenticator};
use crate::consent::{decide_within, ConsentDecision, ConsentPrompt};
use crate::error::PbapError;
use crate::obex::{
    read_packet, Header, HeaderSet, Opcode, Request, Response, ResponseCode, MAX_PACKET_LENGTH,
    MIN_PACKET_LENGTH,
};
use crate::pbap::{ContentSelector, GetResponder, ObexDispatcher, VersionState};
use crate::session::{SessionAction, SessionMachine, SessionMessage, SessionRegistry};
use crate::state::ConnectionStatus;

/// How long a refused peer gets to send the request we answer with 503.
const REJECT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Events emitted by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Externally visible status of a peer changed.
    StateChanged {
        peer: Address,
        status: ConnectionStatus,
    },
    /// Consent was requested for a peer.
    PermissionRequested { peer: Address },
    /// The peer challenged us for OBEX authentication.
    AuthChallenge { peer: Address },
    /// Error occurred.
    Error(String),
}

/// Shared collaborators every session needs.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<SessionRegistry>,
    pub consent: Arc<dyn ConsentPrompt>,
    pub selector: Arc<ContentSelector>,
    pub versions: Arc<VersionState>,
    pub permission_timeout: Duration,
    pub event_tx: mpsc::Sender<ConnectionEvent>,
}

/// Piece of a GET response produced by the dispatcher thread.
#[derive(Debug)]
enum GetChunk {
    Headers(Vec<u8>),
    Body(Vec<u8>),
}

/// Forwards dispatcher output to the connection task.
struct ChannelResponder {
    tx: mpsc::Sender<GetChunk>,
}

impl GetResponder for ChannelResponder {
    fn send_headers(&mut self, app_params: Vec<u8>) -> Result<(), PbapError> {
        self.tx
            .blocking_send(GetChunk::Headers(app_params))
            .map_err(|_| PbapError::Transport("response channel closed".into()))
    }

    fn write_body(&mut self, chunk: &[u8]) -> Result<(), PbapError> {
        self.tx
            .blocking_send(GetChunk::Body(chunk.to_vec()))
            .map_err(|_| PbapError::Transport("response channel closed".into()))
    }
}

/// What the peer sent while a GET response was in flight.
enum Followup {
    Continue,
    Abort,
}

/// Route to the session queue for OBEX authentication.
struct AuthLink {
    authenticator: Arc<ObexAuthenticator>,
    session_tx: mpsc::Sender<SessionMessage>,
}

/// OBEX server loop over one byte stream.
pub struct ObexConnection<R, W> {
    reader: R,
    writer: W,
    dispatcher: Option<ObexDispatcher>,
    max_packet: u16,
    auth: Option<AuthLink>,
}

impl<R, W> ObexConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, dispatcher: ObexDispatcher) -> Self {
        Self {
            reader,
            writer,
            dispatcher: Some(dispatcher),
            max_packet: MIN_PACKET_LENGTH,
            auth: None,
        }
    }

    /// Answer OBEX authentication challenges through `authenticator`.
    pub fn with_auth(
        mut self,
        authenticator: Arc<ObexAuthenticator>,
        session_tx: mpsc::Sender<SessionMessage>,
    ) -> Self {
        self.auth = Some(AuthLink {
            authenticator,
            session_tx,
        });
        self
    }

    /// Serve requests until the peer disconnects or the stream fails.
    pub async fn serve(&mut self) -> Result<(), PbapError> {
        let mut partial_get: Option<HeaderSet> = None;

        loop {
            let Some(frame) = read_packet(&mut self.reader).await? else {
                info!("Peer closed the OBEX stream");
                return Ok(());
            };

            let request = match Request::decode(&frame) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Undecodable request: {}", e);
                    self.send(Response::new(ResponseCode::BadRequest)).await?;
                    continue;
                }
            };
            debug!(
                "{} request, {} bytes",
                request.opcode.as_str(),
                frame.len()
            );

            match request.opcode {
                Opcode::Connect => {
                    let response = self.on_connect(&request).await?;
                    self.send(response).await?;
                }
                Opcode::Disconnect => {
                    let code = self.dispatcher()?.on_disconnect();
                    self.send(Response::new(code)).await?;
                    return Ok(());
                }
                Opcode::SetPath => {
                    let code = match request.set_path {
                        Some(flags) => self.dispatcher()?.on_set_path(flags, &request.headers),
                        None => ResponseCode::BadRequest,
                    };
                    self.send(Response::new(code)).await?;
                }
                Opcode::Put => {
                    let code = self.dispatcher()?.on_put();
                    self.send(Response::new(code)).await?;
                }
                Opcode::Abort => {
                    partial_get = None;
                    let code = self.dispatcher()?.on_abort();
                    self.send(Response::new(code)).await?;
                }
                Opcode::Get => {
                    let mut headers = partial_get.take().unwrap_or_default();
                    headers.extend(request.headers);
                    if request.is_final {
                        self.handle_get(headers).await?;
                    } else {
                        partial_get = Some(headers);
                        self.send(Response::new(ResponseCode::Continue)).await?;
                    }
                }
            }
        }
    }

    fn dispatcher(&mut self) -> Result<&mut ObexDispatcher, PbapError> {
        self.dispatcher
            .as_mut()
            .ok_or_else(|| PbapError::Transport("dispatcher lost".into()))
    }

    async fn send(&mut self, response: Response) -> Result<(), PbapError> {
        debug!("Responding {}", response.code);
        self.writer.write_all(&response.encode()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn on_connect(&mut self, request: &Request) -> Result<Response, PbapError> {
        if let Some(info) = request.connect {
            self.max_packet = info
                .max_packet_length
                .clamp(MIN_PACKET_LENGTH, MAX_PACKET_LENGTH);
            debug!("Negotiated max packet length {}", self.max_packet);
        }

        let mut response = self.dispatcher()?.on_connect(&request.headers);
        if response.code != ResponseCode::Success {
            return Ok(response);
        }

        if let Some(challenge) = request.headers.auth_challenge() {
            let challenge = challenge.to_vec();
            match self.answer_challenge(&challenge).await {
                Some(answer) => response.headers.add(Header::AuthResponse(answer)),
                None => {
                    info!("No credentials for OBEX challenge");
                    return Ok(Response::connect(ResponseCode::Unauthorized, HeaderSet::new()));
                }
            }
        }
        Ok(response)
    }

    async fn answer_challenge(&mut self, challenge: &[u8]) -> Option<Vec<u8>> {
        let nonce = challenge_nonce(challenge)?.to_vec();
        let link = self.auth.as_ref()?;
        if link
            .session_tx
            .send(SessionMessage::AuthChallenge)
            .await
            .is_err()
        {
            return None;
        }
        let credentials = link.authenticator.challenge().await?;
        Some(auth_response(&nonce, &credentials))
    }

    /// Run a GET on a blocking thread and stream its output in packets.
    async fn handle_get(&mut self, headers: HeaderSet) -> Result<(), PbapError> {
        let mut dispatcher = self
            .dispatcher
            .take()
            .ok_or_else(|| PbapError::Transport("dispatcher lost".into()))?;
        let abort = dispatcher.abort_flag();

        let (tx, mut rx) = mpsc::channel(4);
        let job = tokio::task::spawn_blocking(move || {
            let mut responder = ChannelResponder { tx };
            let code = dispatcher.on_get(&headers, &mut responder);
            (dispatcher, code)
        });

        let mut app_params: Option<Vec<u8>> = None;
        let mut body: Vec<u8> = Vec::new();
        let mut produced_body = false;
        let mut aborted = false;
        let mut failure: Option<PbapError> = None;

        'stream: while let Some(chunk) = rx.recv().await {
            match chunk {
                GetChunk::Headers(params) => app_params = Some(params),
                GetChunk::Body(bytes) => {
                    produced_body = true;
                    body.extend_from_slice(&bytes);
                }
            }

            loop {
                let room = self.body_room(app_params.as_deref());
                if body.len() < room {
                    break;
                }
                let mut packet = HeaderSet::new();
                if let Some(params) = app_params.take() {
                    packet.add(Header::ApplicationParameters(params));
                }
                packet.add(Header::Body(body.drain(..room).collect()));
                if let Err(e) = self
                    .send(Response::with_headers(ResponseCode::Continue, packet))
                    .await
                {
                    failure = Some(e);
                    break 'stream;
                }
                match self.next_followup().await {
                    Ok(Followup::Continue) => {}
                    Ok(Followup::Abort) => {
                        aborted = true;
                        break 'stream;
                    }
                    Err(e) => {
                        failure = Some(e);
                        break 'stream;
                    }
                }
            }
        }

        if aborted || failure.is_some() {
            abort.raise();
        }
        drop(rx);

        let (dispatcher, code) = job
            .await
            .map_err(|e| PbapError::Transport(format!("GET worker failed: {}", e)))?;
        self.dispatcher = Some(dispatcher);

        if let Some(e) = failure {
            return Err(e);
        }
        if aborted {
            info!("GET aborted by peer");
            return self.send(Response::new(ResponseCode::Success)).await;
        }

        let mut last = HeaderSet::new();
        if let Some(params) = app_params {
            last.add(Header::ApplicationParameters(params));
        }
        if code == ResponseCode::Success && produced_body {
            last.add(Header::EndOfBody(body));
        }
        self.send(Response::with_headers(code, last)).await
    }

    /// Body bytes that fit in one response packet.
    fn body_room(&self, app_params: Option<&[u8]>) -> usize {
        let mut used = 3 + 3;
        if let Some(params) = app_params {
            used += 3 + params.len();
        }
        (self.max_packet as usize).saturating_sub(used).max(1)
    }

    async fn next_followup(&mut self) -> Result<Followup, PbapError> {
        let frame = read_packet(&mut self.reader)
            .await?
            .ok_or_else(|| PbapError::Transport("peer closed mid-response".into()))?;
        let request = Request::decode(&frame)?;
        match request.opcode {
            Opcode::Get => Ok(Followup::Continue),
            Opcode::Abort => Ok(Followup::Abort),
            other => Err(PbapError::Transport(format!(
                "{} during GET response",
                other.as_str()
            ))),
        }
    }
}

/// Answer the first request on a refused connection with 503 Unavailable.
pub async fn reject_peer<R, W>(mut reader: R, mut writer: W) -> Result<(), PbapError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(frame) = read_packet(&mut reader).await? else {
        return Ok(());
    };
    let response = match Request::decode(&frame) {
        Ok(request) if request.opcode == Opcode::Connect => {
            Response::connect(ResponseCode::ServiceUnavailable, HeaderSet::new())
        }
        _ => Response::new(ResponseCode::ServiceUnavailable),
    };
    writer.write_all(&response.encode()).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

/// Handler for a single Bluetooth connection.
///
/// Owns the session state machine and carries out its actions. Messages
/// are taken from the session queue one at a time.
pub struct ConnectionHandler<S> {
    stream: Option<S>,
    peer: Address,
    machine: SessionMachine,
    ctx: SessionContext,
    authenticator: Arc<ObexAuthenticator>,
    tx: mpsc::Sender<SessionMessage>,
    rx: mpsc::Receiver<SessionMessage>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a new connection handler. `tx`/`rx` are the session queue;
    /// the registry holds another sender for the same queue.
    pub fn new(
        stream: S,
        peer: Address,
        ctx: SessionContext,
        tx: mpsc::Sender<SessionMessage>,
        rx: mpsc::Receiver<SessionMessage>,
    ) -> Self {
        Self {
            stream: Some(stream),
            peer,
            machine: SessionMachine::new(peer),
            ctx,
            authenticator: Arc::new(ObexAuthenticator::new()),
            tx,
            rx,
        }
    }

    /// Emit an event.
    async fn emit(&self, event: ConnectionEvent) {
        let _ = self.ctx.event_tx.send(event).await;
    }

    /// Run the session until it finishes.
    pub async fn run(mut self) -> Result<()> {
        info!("Connection handler started for {}", self.peer);

        let mut pending: VecDeque<SessionAction> = self.machine.start().into();
        loop {
            while let Some(action) = pending.pop_front() {
                match action {
                    SessionAction::StartObexServer => {
                        if let Some(stream) = self.stream.take() {
                            pending.extend(self.serve_obex(stream).await);
                        }
                    }
                    SessionAction::StartRejectResponder => {
                        if let Some(stream) = self.stream.take() {
                            let peer = self.peer;
                            tokio::spawn(async move {
                                let (reader, writer) = tokio::io::split(stream);
                                match tokio::time::timeout(
                                    REJECT_RESPONSE_TIMEOUT,
                                    reject_peer(reader, writer),
                                )
                                .await
                                {
                                    Ok(Ok(())) => {}
                                    Ok(Err(e)) => debug!("Reject responder for {}: {}", peer, e),
                                    Err(_) => debug!("Reject responder for {} timed out", peer),
                                }
                            });
                        }
                    }
                    SessionAction::CloseSession => {
                        self.authenticator.cancel();
                        self.stream = None;
                        info!("Session with {} closed", self.peer);
                    }
                    other => self.perform(other).await,
                }
            }

            if self.machine.is_finished() {
                break;
            }

            match self.rx.recv().await {
                Some(message) => pending.extend(self.apply(message).await),
                None => pending.extend(self.machine.force_finish()),
            }
        }

        info!("Connection handler for {} finished", self.peer);
        Ok(())
    }

    /// Feed a message to the machine; a violation tears the session down.
    async fn apply(&mut self, message: SessionMessage) -> Vec<SessionAction> {
        match self.machine.handle(message) {
            Ok(actions) => actions,
            Err(e) => {
                error!("Session {}: {}", self.peer, e);
                self.emit(ConnectionEvent::Error(e.to_string())).await;
                self.machine.force_finish()
            }
        }
    }

    /// Actions that do not change who owns the stream.
    async fn perform(&mut self, action: SessionAction) {
        match action {
            SessionAction::NotifyStateChanged(status) => {
                self.emit(ConnectionEvent::StateChanged {
                    peer: self.peer,
                    status,
                })
                .await;
            }
            SessionAction::RequestPermission => self.request_permission().await,
            SessionAction::RemoveFromRegistry => self.ctx.registry.remove(self.peer),
            SessionAction::PromptAuthKey => {
                self.emit(ConnectionEvent::AuthChallenge { peer: self.peer })
                    .await;
            }
            SessionAction::DeliverSessionKey(key) => {
                self.authenticator.provide_key(key);
            }
            SessionAction::CancelAuth => {
                self.authenticator.cancel();
            }
            SessionAction::StartObexServer
            | SessionAction::StartRejectResponder
            | SessionAction::CloseSession => {
                warn!("Unexpected stream action {:?}", action);
            }
        }
    }

    async fn request_permission(&mut self) {
        self.emit(ConnectionEvent::PermissionRequested { peer: self.peer })
            .await;

        let decision = self.ctx.consent.request(self.peer);
        let timeout = self.ctx.permission_timeout;
        let tx = self.tx.clone();
        let peer = self.peer;
        tokio::spawn(async move {
            let message = match decide_within(decision, timeout).await {
                Ok(ConsentDecision::Allow) => SessionMessage::Authorized,
                Ok(ConsentDecision::Deny) => SessionMessage::Rejected,
                Err(e) => {
                    warn!("Consent for {}: {}", peer, e);
                    SessionMessage::AuthTimeout
                }
            };
            let _ = tx.send(message).await;
        });
    }

    /// Serve OBEX while still taking session messages.
    ///
    /// Returns the actions left over once the session is finishing.
    async fn serve_obex(&mut self, stream: S) -> Vec<SessionAction> {
        let (reader, writer) = tokio::io::split(stream);
        let dispatcher = ObexDispatcher::new(self.ctx.selector.clone(), self.ctx.versions.clone());
        let mut connection = ObexConnection::new(reader, writer, dispatcher)
            .with_auth(self.authenticator.clone(), self.tx.clone());

        let obex = connection.serve();
        tokio::pin!(obex);

        loop {
            tokio::select! {
                result = &mut obex => {
                    if let Err(e) = &result {
                        warn!("OBEX session with {} ended: {}", self.peer, e);
                        if e.is_fatal() {
                            self.emit(ConnectionEvent::Error(e.to_string())).await;
                        }
                    }
                    return self.apply(SessionMessage::Disconnect).await;
                }
                Some(message) = self.rx.recv() => {
                    let actions = self.apply(message).await;
                    if self.machine.is_finished() {
                        return actions;
                    }
                    for action in actions {
                        self.perform(action).await;
                    }
                }
            }
        }
    }
}
