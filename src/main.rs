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

//! PBAP server daemon.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pbap_server::bluetooth::{PbapServer, SessionContext};
use pbap_server::config::Config;
use pbap_server::consent::PolicyConsent;
use pbap_server::events::EventProcessor;
use pbap_server::pbap::{ContentSelector, VersionState};
use pbap_server::session::SessionRegistry;
use pbap_server::state::AppState;
use pbap_server::storage::{CounterFile, OwnerCard, SqlitePhonebook, TextComposer};

/// How often the phonebook database is checked for outside changes.
const CHANGE_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pbap_server=info".parse()?),
        )
        .init();

    info!("Starting PBAP server v{}...", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("Configuration loaded");

    // Storage
    let phonebook = Arc::new(SqlitePhonebook::new(&config.data_dir)?);
    let counter_file = CounterFile::new(&config.data_dir);
    let versions = Arc::new(VersionState::load_from(&counter_file)?);
    info!("Phonebook storage initialized");

    let owner = OwnerCard {
        name: config.owner_name(),
        number: config.phonebook.owner_number.clone(),
    };
    let selector = Arc::new(ContentSelector::new(
        phonebook.clone(),
        phonebook.clone(),
        Arc::new(TextComposer),
        owner,
        config.phonebook.include_photos,
    ));

    let state = AppState::new();
    let registry = SessionRegistry::new();

    // Bluetooth
    let server = PbapServer::new().await?;
    server.set_name(&config.bluetooth.device_name).await?;
    let consent = Arc::new(PolicyConsent::new(
        config.bluetooth.trusted_addresses(),
        config.bluetooth.auto_accept,
        Some(server.adapter().clone()),
    ));
    let mut event_rx = server
        .listen(config.bluetooth.rfcomm_channel, |event_tx| SessionContext {
            registry: registry.clone(),
            consent,
            selector,
            versions: versions.clone(),
            permission_timeout: config.bluetooth.permission_timeout(),
            event_tx,
        })
        .await?;
    info!(
        "PBAP server ready as '{}' on {}",
        config.bluetooth.device_name,
        server.address().await?
    );

    tokio::spawn(watch_phonebook(
        phonebook,
        versions.clone(),
        CounterFile::new(&config.data_dir),
    ));

    let mut processor = EventProcessor::new(state.clone(), registry)
        .with_session_key(config.bluetooth.obex_session_key.clone());

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                if let Err(e) = processor.process_event(event).await {
                    error!("Error processing event: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Err(e) = versions.persist_to(&counter_file) {
        warn!("Failed to save version counters: {}", e);
    }
    info!(
        "PBAP server stopped ({} peers connected)",
        state.connected_peers().len()
    );
    Ok(())
}

/// Bump the folder version counters when another process edits the
/// phonebook database.
async fn watch_phonebook(
    phonebook: Arc<SqlitePhonebook>,
    versions: Arc<VersionState>,
    counter_file: CounterFile,
) {
    let mut last = match phonebook.data_version() {
        Ok(version) => version,
        Err(e) => {
            error!("Cannot watch phonebook database: {}", e);
            return;
        }
    };

    let mut interval = tokio::time::interval(CHANGE_POLL_INTERVAL);
    loop {
        interval.tick().await;
        let current = match phonebook.data_version() {
            Ok(version) => version,
            Err(e) => {
                warn!("Phonebook change check failed: {}", e);
                continue;
            }
        };
        if current == last {
            continue;
        }
        last = current;
        debug!("Phonebook database changed");
        versions.record_change(true, true);
        if let Err(e) = versions.persist_to(&counter_file) {
            warn!("Failed to save version counters: {}", e);
        }
    }
}
