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

//! Persisted version counters.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::pbap::VersionSnapshot;

/// JSON file holding the last known version state.
pub struct CounterFile {
    path: PathBuf,
}

impl CounterFile {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("version_counters.json"),
        }
    }

    /// `None` if nothing has been saved yet.
    pub fn load(&self) -> Result<Option<VersionSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, snapshot: &VersionSnapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
