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

//! Plugin configuration file. Per-device sharing settings are embedded as
//! full `NxConfig` documents and go through the same version/kind gate and
//! validation as documents decoded from raw bytes.

use std::path::{Path, PathBuf};

use eyre::WrapErr;
use figment::Figment;
use figment::providers::{Format, Toml};
use nx_config::{NxConfig, NxSharing, Sharing, TimeSliceInterval};
use serde::Deserialize;

pub const DEFAULT_CDI_DIR: &str = "/var/run/cdi";
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/devices/platform";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    /// Directory of the shared CDI spec registry.
    #[serde(default = "default_cdi_dir")]
    pub cdi_dir: PathBuf,

    /// Where Nx platform devices enumerate.
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,

    /// Explicit device inventory. When empty, the sysfs probe decides.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,

    /// Sharing applied to probed devices that have no explicit entry.
    /// Defaults to time slicing with the default interval.
    #[serde(default)]
    pub default_sharing: Option<NxConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceEntry {
    pub name: String,
    pub config: Option<NxConfig>,
}

fn default_cdi_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CDI_DIR)
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(DEFAULT_SYSFS_ROOT)
}

impl Default for PluginConfig {
    fn default() -> Self {
        PluginConfig {
            cdi_dir: default_cdi_dir(),
            sysfs_root: default_sysfs_root(),
            devices: Vec::new(),
            default_sharing: None,
        }
    }
}

impl PluginConfig {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        if !path.is_file() {
            eyre::bail!("plugin config {} is not a file", path.display());
        }
        Figment::new()
            .merge(Toml::file(path))
            .extract()
            .wrap_err_with(|| format!("reading plugin config {}", path.display()))
    }

    /// Sharing used for devices the config file does not mention.
    pub fn fallback_sharing(&self) -> eyre::Result<Sharing> {
        match &self.default_sharing {
            Some(document) => resolve_document(document),
            None => Ok(NxSharing::time_slicing(TimeSliceInterval::Default).resolve()?),
        }
    }
}

/// Gates an embedded `NxConfig` document the same way raw bytes are gated,
/// then collapses it to the resolved [`Sharing`] type.
pub fn resolve_document(document: &NxConfig) -> eyre::Result<Sharing> {
    nx_config::validate_document(document)?;
    document.validate()?;
    let Some(sharing) = &document.sharing else {
        // validate() already rejected this; kept so the match is total.
        eyre::bail!("no sharing strategy set");
    };
    Ok(sharing.resolve()?)
}
