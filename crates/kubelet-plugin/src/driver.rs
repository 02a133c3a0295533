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

//! Adapter between the host runtime's batched claim callbacks and the
//! per-claim device state engine. This is the only component that talks to
//! the registration helper; everything it hands back is keyed by claim
//! identity so one claim's failure never disturbs its siblings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use eyre::WrapErr;

use crate::claims::{
    ClaimUid, DriverResources, NamespacedClaim, Pool, PreparedDevice, PublishedDevice,
    ResourceClaim, Slice,
};
use crate::device_state::DeviceState;
use crate::errors::{PrepareError, UnprepareError};

/// The host runtime's device registry, owned by the registration helper.
/// The driver publishes its resource pool through this exactly once at
/// startup.
#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    async fn publish_resources(&self, resources: DriverResources) -> eyre::Result<()>;
}

/// Registry used when the process runs without a registration helper
/// attached (one-off subcommands, development): the publication is recorded
/// in the structured log instead of being sent anywhere.
pub struct LogRegistry;

#[async_trait]
impl ResourceRegistry for LogRegistry {
    async fn publish_resources(&self, resources: DriverResources) -> eyre::Result<()> {
        let payload = serde_json::to_string(&resources)?;
        tracing::info!(resources = %payload, "node resource pool");
        Ok(())
    }
}

pub struct Driver {
    state: Arc<DeviceState>,
    node_name: String,
}

impl Driver {
    /// Builds the driver and advertises the node's allocatable devices.
    pub async fn start(
        node_name: impl Into<String>,
        state: Arc<DeviceState>,
        registry: &dyn ResourceRegistry,
    ) -> eyre::Result<Self> {
        let driver = Driver {
            state,
            node_name: node_name.into(),
        };
        registry
            .publish_resources(driver.resource_pool())
            .await
            .wrap_err("publishing node resources")?;
        Ok(driver)
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// The one-shot resource-pool advertisement for this node. Device order
    /// follows the inventory, which is stable across calls.
    pub fn resource_pool(&self) -> DriverResources {
        let devices = self
            .state
            .allocatable_devices()
            .map(|device| PublishedDevice {
                name: device.name.clone(),
            })
            .collect();
        DriverResources {
            pools: BTreeMap::from([(
                self.node_name.clone(),
                Pool {
                    slices: vec![Slice { devices }],
                },
            )]),
        }
    }

    /// Prepares a batch of claims. The CDI spec cache is refreshed exactly
    /// once before any claim is processed, bounding staleness to the start
    /// of the batch; if that refresh fails, staleness cannot be bounded and
    /// every claim in the batch conservatively fails with the cache error.
    pub async fn prepare_resource_claims(
        &self,
        claims: &[ResourceClaim],
    ) -> HashMap<ClaimUid, Result<Vec<PreparedDevice>, PrepareError>> {
        tracing::info!(claims = claims.len(), "preparing resource claims");
        let mut results = HashMap::with_capacity(claims.len());

        if let Err(source) = self.state.cdi().refresh().await {
            tracing::error!(error = %source, "CDI spec cache refresh failed, failing the batch");
            for claim in claims {
                results.insert(
                    claim.uid.clone(),
                    Err(PrepareError::CacheRefresh {
                        claim: claim.uid.clone(),
                        source: source.clone(),
                    }),
                );
            }
            return results;
        }

        for claim in claims {
            results.insert(claim.uid.clone(), self.prepare_resource_claim(claim));
        }
        results
    }

    fn prepare_resource_claim(
        &self,
        claim: &ResourceClaim,
    ) -> Result<Vec<PreparedDevice>, PrepareError> {
        tracing::info!(
            claim = %claim.uid,
            namespace = %claim.namespace,
            name = %claim.name,
            "preparing claim"
        );
        if let Some(allocation) = &claim.allocation {
            for result in &allocation.devices {
                tracing::debug!(
                    claim = %claim.uid,
                    request = %result.request,
                    driver = %result.driver,
                    pool = %result.pool,
                    device = %result.device,
                    "allocation result"
                );
            }
        } else {
            tracing::warn!(claim = %claim.uid, "claim has no allocation result");
        }

        self.state.prepare(claim).inspect_err(|error| {
            tracing::error!(claim = %claim.uid, %error, "failed to prepare devices for claim");
        })
    }

    /// Unprepares a batch of claims, symmetric to
    /// [`Driver::prepare_resource_claims`]. A failed refresh is logged and
    /// release continues against the cached view: release must not wedge on
    /// registry trouble. Partial release failures are logged; the binding is
    /// gone either way, so the claim is reported as unprepared.
    pub async fn unprepare_resource_claims(
        &self,
        claims: &[NamespacedClaim],
    ) -> HashMap<ClaimUid, Result<(), UnprepareError>> {
        tracing::info!(claims = claims.len(), "unpreparing resource claims");

        if let Err(error) = self.state.cdi().refresh().await {
            tracing::warn!(
                %error,
                "CDI spec cache refresh failed before unprepare, continuing with cached view"
            );
        }

        let mut results = HashMap::with_capacity(claims.len());
        for claim in claims {
            let outcome = match self.state.unprepare(&claim.uid) {
                Ok(()) => Ok(()),
                Err(error @ UnprepareError::PartialRelease { .. }) => {
                    tracing::warn!(claim = %claim.uid, %error, "devices failed to release");
                    Ok(())
                }
            };
            results.insert(claim.uid.clone(), outcome);
        }
        results
    }

    /// Sink for failures the registration helper surfaces outside the
    /// synchronous request/response path.
    pub fn handle_error(&self, error: &dyn std::error::Error, claim: &ClaimUid) {
        tracing::error!(claim = %claim, %error, "error handling resource claim");
    }
}
