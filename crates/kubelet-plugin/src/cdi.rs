/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 IBM Corporation & Affiliates. All rights reserved.
 * SPDX-License-Identifier: Apache-2.0
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Cache over the on-disk CDI spec registry.
//!
//! The registry directory is shared with other agents on the node, so the
//! in-memory view is only trusted after an explicit [`CdiCache::refresh`].
//! The driver refreshes exactly once per incoming claim batch, which bounds
//! staleness to "as of the start of this batch" without a refresh per claim.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Vendor/class prefix of every CDI device this driver injects.
pub const CDI_KIND: &str = "ibm.com/nx";
pub const CDI_VERSION: &str = "0.6.0";

/// Character device through which userspace reaches the Nx coprocessor.
pub const NX_DEVICE_NODE: &str = "/dev/crypto/nx-gzip";

const REFRESH_ATTEMPTS: u32 = 3;
const REFRESH_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CdiError {
    #[error("failed to refresh CDI spec cache from {dir:?} after {attempts} attempts: {reason}")]
    Refresh {
        dir: PathBuf,
        attempts: u32,
        reason: String,
    },
    #[error("failed to write CDI spec {path:?}: {reason}")]
    WriteSpec { path: PathBuf, reason: String },
}

/// On-disk CDI spec shape, reduced to the fields this driver reads and
/// writes. Foreign spec files keep fields we do not model; those files are
/// never rewritten by us.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdiSpecFile {
    cdi_version: String,
    kind: String,
    #[serde(default)]
    devices: Vec<CdiSpecDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdiSpecDevice {
    name: String,
    container_edits: ContainerEdits,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerEdits {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_nodes: Vec<DeviceNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNode {
    pub path: String,
}

/// Container edits for a whole (time-sliced) Nx device.
pub fn base_edits(device: &str) -> ContainerEdits {
    ContainerEdits {
        device_nodes: vec![DeviceNode {
            path: NX_DEVICE_NODE.to_string(),
        }],
        env: vec![format!("NX_DEVICE={device}")],
    }
}

/// Container edits for one partition of a space-partitioned Nx device.
pub fn partition_edits(device: &str, slot: u32) -> ContainerEdits {
    ContainerEdits {
        device_nodes: vec![DeviceNode {
            path: NX_DEVICE_NODE.to_string(),
        }],
        env: vec![
            format!("NX_DEVICE={device}"),
            format!("NX_PARTITION={slot}"),
        ],
    }
}

pub struct CdiCache {
    dir: PathBuf,
    /// The one spec file this driver owns; generated entries live here.
    spec_path: PathBuf,
    entries: RwLock<HashMap<String, Vec<String>>>,
    /// Serializes spec-file writes so concurrent generation of entries for
    /// the same device cannot race to create duplicates.
    writer: Mutex<()>,
}

impl CdiCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CdiError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CdiError::WriteSpec {
            path: dir.clone(),
            reason: e.to_string(),
        })?;
        let spec_path = dir.join(format!("{}.json", crate::DRIVER_NAME));
        Ok(CdiCache {
            dir,
            spec_path,
            entries: RwLock::new(HashMap::new()),
            writer: Mutex::new(()),
        })
    }

    /// Fully qualified CDI device ID for a device or sub-device name.
    pub fn qualified_id(name: &str) -> String {
        format!("{CDI_KIND}={name}")
    }

    /// Re-reads the registry directory and atomically replaces the cached
    /// view. Transient read failures are retried with backoff; the error is
    /// only surfaced once the attempts are exhausted.
    pub async fn refresh(&self) -> Result<(), CdiError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.read_registry() {
                Ok(fresh) => {
                    *self.entries.write().expect("lock poisoned") = fresh;
                    return Ok(());
                }
                Err(reason) if attempt < REFRESH_ATTEMPTS => {
                    tracing::warn!(
                        dir = %self.dir.display(),
                        attempt,
                        reason = %reason,
                        "CDI registry read failed, retrying"
                    );
                    tokio::time::sleep(REFRESH_BACKOFF * attempt).await;
                }
                Err(reason) => {
                    return Err(CdiError::Refresh {
                        dir: self.dir.clone(),
                        attempts: attempt,
                        reason,
                    });
                }
            }
        }
    }

    /// Injectable IDs for a device, as of the last refresh or generation.
    pub fn device_ids(&self, name: &str) -> Option<Vec<String>> {
        self.entries
            .read()
            .expect("lock poisoned")
            .get(name)
            .cloned()
    }

    /// Returns the injectable IDs for `name`, generating and registering a
    /// spec entry in the driver-owned spec file if none exists yet.
    pub fn ensure_entry(&self, name: &str, edits: ContainerEdits) -> Result<Vec<String>, CdiError> {
        if let Some(ids) = self.device_ids(name) {
            return Ok(ids);
        }

        let _writer = self.writer.lock().expect("lock poisoned");
        // Another claim may have generated the entry while we waited.
        if let Some(ids) = self.device_ids(name) {
            return Ok(ids);
        }

        let mut spec = self.load_own_spec()?;
        if !spec.devices.iter().any(|d| d.name == name) {
            spec.devices.push(CdiSpecDevice {
                name: name.to_string(),
                container_edits: edits,
            });
            self.store_own_spec(&spec)?;
        }

        let ids = vec![Self::qualified_id(name)];
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(name.to_string(), ids.clone());
        tracing::info!(device = name, "generated CDI spec entry");
        Ok(ids)
    }

    /// Removes a generated entry from the driver-owned spec file and the
    /// cache. Removing an entry that does not exist is not an error.
    pub fn remove_entry(&self, name: &str) -> Result<(), CdiError> {
        let _writer = self.writer.lock().expect("lock poisoned");

        let mut spec = self.load_own_spec()?;
        let before = spec.devices.len();
        spec.devices.retain(|d| d.name != name);
        if spec.devices.len() != before {
            self.store_own_spec(&spec)?;
        }

        self.entries.write().expect("lock poisoned").remove(name);
        Ok(())
    }

    fn read_registry(&self) -> Result<HashMap<String, Vec<String>>, String> {
        let mut fresh = HashMap::new();
        let dir_entries = std::fs::read_dir(&self.dir).map_err(|e| e.to_string())?;
        for dir_entry in dir_entries {
            let path = dir_entry.map_err(|e| e.to_string())?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let spec = match read_spec_file(&path) {
                Ok(spec) => spec,
                Err(reason) => {
                    // Other agents own most files in the registry; a file we
                    // cannot parse is skipped, not fatal.
                    tracing::warn!(path = %path.display(), reason = %reason, "skipping unreadable CDI spec");
                    continue;
                }
            };
            if spec.kind != CDI_KIND {
                continue;
            }
            for device in spec.devices {
                fresh.insert(device.name.clone(), vec![Self::qualified_id(&device.name)]);
            }
        }
        Ok(fresh)
    }

    fn load_own_spec(&self) -> Result<CdiSpecFile, CdiError> {
        if !self.spec_path.exists() {
            return Ok(CdiSpecFile {
                cdi_version: CDI_VERSION.to_string(),
                kind: CDI_KIND.to_string(),
                devices: Vec::new(),
            });
        }
        read_spec_file(&self.spec_path).map_err(|reason| CdiError::WriteSpec {
            path: self.spec_path.clone(),
            reason,
        })
    }

    fn store_own_spec(&self, spec: &CdiSpecFile) -> Result<(), CdiError> {
        let write_err = |reason: String| CdiError::WriteSpec {
            path: self.spec_path.clone(),
            reason,
        };
        let bytes = serde_json::to_vec_pretty(spec).map_err(|e| write_err(e.to_string()))?;
        // Write-and-rename so concurrent registry readers never observe a
        // truncated spec file.
        let tmp_path = self.spec_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, bytes).map_err(|e| write_err(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.spec_path).map_err(|e| write_err(e.to_string()))?;
        Ok(())
    }
}

fn read_spec_file(path: &Path) -> Result<CdiSpecFile, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}
