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

//! Bluetooth RFCOMM server implementation.

use anyhow::Result;
use bluer::rfcomm::{Listener, SocketAddr, Stream};
use bluer::{Adapter, Address};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::connection::{ConnectionEvent, ConnectionHandler, SessionContext};
use crate::session::SessionHandle;

/// PBAP Phonebook Server Equipment service class.
pub const PBAP_PSE_UUID: Uuid = Uuid::from_u128(0x0000112F_0000_1000_8000_00805F9B34FB);

/// Messages a session queue can hold before senders wait.
const SESSION_QUEUE_DEPTH: usize = 16;

/// Bluetooth server that listens for incoming PBAP connections.
pub struct PbapServer {
    adapter: Adapter,
}

impl PbapServer {
    /// Create a new server on the default adapter.
    pub async fn new() -> Result<Self> {
        info!("Initializing Bluetooth server...");

        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        adapter.set_discoverable(true).await?;
        adapter.set_pairable(true).await?;
        info!("Adapter is discoverable and pairable");

        Ok(Self { adapter })
    }

    /// Adapter handle, for consent lookups.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Get the adapter address.
    pub async fn address(&self) -> Result<Address> {
        Ok(self.adapter.address().await?)
    }

    /// Set the device name.
    pub async fn set_name(&self, name: &str) -> Result<()> {
        self.adapter.set_alias(name.to_string()).await?;
        info!("Bluetooth name set to: {}", name);
        Ok(())
    }

    /// Start listening on `channel`.
    ///
    /// Returns a channel receiver for connection events.
    pub async fn listen(
        &self,
        channel: u8,
        ctx_builder: impl FnOnce(mpsc::Sender<ConnectionEvent>) -> SessionContext,
    ) -> Result<mpsc::Receiver<ConnectionEvent>> {
        let (event_tx, event_rx) = mpsc::channel(32);

        let local_addr = SocketAddr::new(Address::any(), channel);
        let listener = Listener::bind(local_addr).await?;
        info!(
            "RFCOMM server listening on channel {} (service {})",
            channel, PBAP_PSE_UUID
        );

        let ctx = ctx_builder(event_tx);
        tokio::spawn(async move {
            Self::accept_loop(listener, ctx).await;
        });

        Ok(event_rx)
    }

    /// Accept loop for incoming connections.
    async fn accept_loop(listener: Listener, ctx: SessionContext) {
        info!("Waiting for connections...");

        loop {
            match listener.accept().await {
                Ok((stream, remote_addr)) => {
                    info!("Connection from: {}", remote_addr.addr);
                    Self::start_session(stream, remote_addr.addr, &ctx);
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    fn start_session(stream: Stream, peer: Address, ctx: &SessionContext) {
        let (tx, rx) = mpsc::channel(SESSION_QUEUE_DEPTH);
        if !ctx.registry.try_insert(peer, SessionHandle::new(tx.clone())) {
            warn!("{} already has a session, closing new socket", peer);
            drop(stream);
            return;
        }

        let handler = ConnectionHandler::new(stream, peer, ctx.clone(), tx, rx);
        tokio::spawn(async move {
            if let Err(e) = handler.run().await {
                error!("Connection handler error: {}", e);
            }
        });
    }
}
