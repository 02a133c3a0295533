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

//! Boundary data types exchanged with the host runtime's registration
//! helper. The helper owns transport and decoding; the driver treats these
//! as read-only inputs and result values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque claim identity assigned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimUid(String);

impl ClaimUid {
    pub fn new(uid: impl Into<String>) -> Self {
        ClaimUid(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClaimUid {
    fn from(value: &str) -> Self {
        ClaimUid(value.to_string())
    }
}

/// A workload's request for devices, carrying the orchestrator-computed
/// allocation decision. Read-only input to the preparation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceClaim {
    pub uid: ClaimUid,
    pub namespace: String,
    pub name: String,
    pub allocation: Option<AllocationResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationResult {
    pub devices: Vec<DeviceAllocationResult>,
}

/// One device the orchestrator allocated to a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAllocationResult {
    /// Name of the request inside the claim this result satisfies.
    pub request: String,
    /// Driver responsible for the device; results for other drivers are
    /// skipped.
    pub driver: String,
    pub pool: String,
    pub device: String,
}

/// Claim identity used by the unprepare path, where the full claim object
/// is no longer available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacedClaim {
    pub uid: ClaimUid,
    pub namespace: String,
    pub name: String,
}

/// A device made ready for a claim: the container-injectable CDI IDs plus
/// the pool/device identity the orchestrator knows it by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedDevice {
    pub request_names: Vec<String>,
    pub pool_name: String,
    pub device_name: String,
    pub cdi_device_ids: Vec<String>,
}

/// One-shot resource-pool advertisement published to the host runtime's
/// device registry at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverResources {
    pub pools: BTreeMap<String, Pool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub slices: Vec<Slice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slice {
    pub devices: Vec<PublishedDevice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedDevice {
    pub name: String,
}
