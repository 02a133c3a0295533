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

//! Node-local discovery of Nx engines. The inventory is built exactly once
//! at startup; discovery failures are fatal rather than producing a driver
//! that silently advertises nothing.

use std::collections::BTreeSet;
use std::path::Path;

use eyre::WrapErr;

use crate::cfg::PluginConfig;
use crate::device_state::Device;

/// Scans the sysfs root for Nx coprocessor platform devices (`nx0`,
/// `nx1`, ...). Returns names in sorted order.
pub fn probe_nx_devices(sysfs_root: &Path) -> eyre::Result<Vec<String>> {
    let entries = std::fs::read_dir(sysfs_root)
        .wrap_err_with(|| format!("probing for Nx devices under {}", sysfs_root.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.wrap_err("reading sysfs entry")?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_nx_engine(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn is_nx_engine(name: &str) -> bool {
    name.strip_prefix("nx")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// Builds the allocatable inventory from the plugin config: explicit
/// device entries win; otherwise every probed Nx engine gets the fallback
/// sharing settings.
pub fn build_inventory(config: &PluginConfig) -> eyre::Result<Vec<Device>> {
    let mut devices = Vec::new();

    if config.devices.is_empty() {
        let fallback = config.fallback_sharing()?;
        for name in probe_nx_devices(&config.sysfs_root)? {
            devices.push(Device {
                name,
                sharing: fallback.clone(),
            });
        }
    } else {
        for entry in &config.devices {
            let sharing = match &entry.config {
                Some(document) => crate::cfg::resolve_document(document)
                    .wrap_err_with(|| format!("sharing config for device {:?}", entry.name))?,
                None => config.fallback_sharing()?,
            };
            devices.push(Device {
                name: entry.name.clone(),
                sharing,
            });
        }
    }

    let mut seen = BTreeSet::new();
    for device in &devices {
        if !seen.insert(device.name.as_str()) {
            eyre::bail!("duplicate device {:?} in inventory", device.name);
        }
    }
    if devices.is_empty() {
        eyre::bail!(
            "no Nx devices found under {} and none configured",
            config.sysfs_root.display()
        );
    }

    Ok(devices)
}

#[cfg(test)]
mod tests {
    use nx_config::Sharing;

    use super::*;
    use crate::cfg::DeviceEntry;

    #[test]
    fn probe_matches_only_nx_engines() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["nx0", "nx12", "nxc", "nx", "gpu0"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }

        let names = probe_nx_devices(dir.path()).unwrap();
        assert_eq!(names, vec!["nx0", "nx12"]);
    }

    #[test]
    fn probe_fails_on_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(probe_nx_devices(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn explicit_entries_override_probing() {
        let config = PluginConfig {
            devices: vec![
                DeviceEntry {
                    name: "nx0".to_string(),
                    config: None,
                },
                DeviceEntry {
                    name: "nx1".to_string(),
                    config: Some(nx_config::NxConfig::new(
                        nx_config::NxSharing::space_partitioning(2),
                    )),
                },
            ],
            ..PluginConfig::default()
        };

        let devices = build_inventory(&config).unwrap();
        assert_eq!(devices.len(), 2);
        assert!(matches!(devices[0].sharing, Sharing::TimeSlicing(_)));
        assert!(matches!(devices[1].sharing, Sharing::SpacePartitioning(_)));
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        let config = PluginConfig {
            devices: vec![
                DeviceEntry {
                    name: "nx0".to_string(),
                    config: None,
                },
                DeviceEntry {
                    name: "nx0".to_string(),
                    config: None,
                },
            ],
            ..PluginConfig::default()
        };
        assert!(build_inventory(&config).is_err());
    }

    #[test]
    fn empty_inventory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = PluginConfig {
            sysfs_root: dir.path().to_path_buf(),
            ..PluginConfig::default()
        };
        assert!(build_inventory(&config).is_err());
    }
}
