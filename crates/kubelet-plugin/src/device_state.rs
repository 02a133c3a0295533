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

//! Node-local device state: the allocatable inventory, partition
//! bookkeeping for space-partitioned devices, and the per-claim
//! prepare/unprepare lifecycle.
//!
//! Per claim the lifecycle is Unbound -> Preparing -> Bound ->
//! Unpreparing -> Unbound; Bound is the only state that survives across
//! calls. Preparation is atomic per claim: either every allocated device is
//! made ready and recorded, or nothing is.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use nx_config::{Sharing, SpacePartitioningConfig};

use crate::cdi::{self, CdiCache};
use crate::claims::{ClaimUid, DeviceAllocationResult, PreparedDevice, ResourceClaim};
use crate::errors::{PrepareError, ReleaseFailure, UnprepareError};

/// Concurrent partitions of an Nx device when the configuration leaves the
/// partition count at zero ("use the device default").
pub const DEFAULT_PARTITION_COUNT: u32 = 8;

/// One allocatable device on this node, immutable for the process lifetime.
/// Replacing the inventory requires a restart; there is no hot-reload.
#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub sharing: Sharing,
}

/// Capacity bookkeeping for one space-partitioned device. Locked only for
/// the duration of a single reserve or release.
struct PartitionLedger {
    capacity: u32,
    reserved: BTreeMap<u32, ClaimUid>,
}

impl PartitionLedger {
    fn new(config: &SpacePartitioningConfig) -> Self {
        // partition_count was validated non-negative at config load.
        let capacity = match u32::try_from(config.partition_count) {
            Ok(0) => DEFAULT_PARTITION_COUNT,
            Ok(count) => count,
            Err(_) => u32::MAX,
        };
        PartitionLedger {
            capacity,
            reserved: BTreeMap::new(),
        }
    }

    /// Reserves the lowest free slot, or `None` when the budget is spent.
    fn reserve(&mut self, claim: &ClaimUid) -> Option<u32> {
        let slot = (0..self.capacity).find(|slot| !self.reserved.contains_key(slot))?;
        self.reserved.insert(slot, claim.clone());
        Some(slot)
    }

    fn release(&mut self, slot: u32) {
        self.reserved.remove(&slot);
    }
}

/// A partition slot held by a bound claim, together with the CDI sub-device
/// generated for it.
struct Reservation {
    device: String,
    slot: u32,
    cdi_name: String,
}

struct PreparedClaim {
    devices: Vec<PreparedDevice>,
    reservations: Vec<Reservation>,
}

/// Per-claim binding slot. The inner mutex serializes concurrent work on
/// the same claim while leaving unrelated claims fully parallel; `None`
/// is the Unbound/Preparing side of the lifecycle, `Some` is Bound.
#[derive(Default)]
struct ClaimSlot(Mutex<Option<PreparedClaim>>);

pub struct DeviceState {
    driver_name: String,
    allocatable: BTreeMap<String, Device>,
    ledgers: HashMap<String, Mutex<PartitionLedger>>,
    claims: Mutex<HashMap<ClaimUid, Arc<ClaimSlot>>>,
    cdi: Arc<CdiCache>,
}

impl DeviceState {
    pub fn new(devices: impl IntoIterator<Item = Device>, cdi: Arc<CdiCache>) -> Self {
        let allocatable: BTreeMap<String, Device> = devices
            .into_iter()
            .map(|device| (device.name.clone(), device))
            .collect();
        let ledgers = allocatable
            .values()
            .filter_map(|device| match &device.sharing {
                Sharing::SpacePartitioning(config) => Some((
                    device.name.clone(),
                    Mutex::new(PartitionLedger::new(config)),
                )),
                Sharing::TimeSlicing(_) => None,
            })
            .collect();
        DeviceState {
            driver_name: crate::DRIVER_NAME.to_string(),
            allocatable,
            ledgers,
            claims: Mutex::new(HashMap::new()),
            cdi,
        }
    }

    pub fn cdi(&self) -> &CdiCache {
        &self.cdi
    }

    /// The allocatable devices of this node, in an order that is stable
    /// across calls so the published resource pool is reproducible.
    pub fn allocatable_devices(&self) -> impl Iterator<Item = &Device> {
        self.allocatable.values()
    }

    pub fn lookup(&self, name: &str) -> Option<&Device> {
        self.allocatable.get(name)
    }

    /// Makes every device allocated to `claim` ready for container
    /// injection and records the binding. Calling this again for a bound
    /// claim returns the recorded devices unchanged and consumes no
    /// additional capacity.
    pub fn prepare(&self, claim: &ResourceClaim) -> Result<Vec<PreparedDevice>, PrepareError> {
        let slot = {
            let mut claims = self.claims.lock().expect("lock poisoned");
            Arc::clone(claims.entry(claim.uid.clone()).or_default())
        };

        // A concurrent Prepare for the same claim waits here and then takes
        // the idempotent path below.
        let mut binding = slot.0.lock().expect("lock poisoned");
        if let Some(prepared) = binding.as_ref() {
            tracing::info!(claim = %claim.uid, "claim already prepared, returning recorded devices");
            return Ok(prepared.devices.clone());
        }

        let prepared = self.prepare_devices(claim)?;
        let devices = prepared.devices.clone();
        *binding = Some(prepared);
        Ok(devices)
    }

    /// Releases everything held by `claim` and removes its binding.
    /// Unpreparing a claim that holds nothing succeeds. Individual release
    /// failures are collected into [`UnprepareError::PartialRelease`]; the
    /// binding is removed regardless, so release is never retried forever
    /// against one bad device.
    pub fn unprepare(&self, claim: &ClaimUid) -> Result<(), UnprepareError> {
        let slot = self.claims.lock().expect("lock poisoned").remove(claim);
        let Some(slot) = slot else {
            tracing::info!(claim = %claim, "no prepared devices for claim, nothing to release");
            return Ok(());
        };
        let Some(prepared) = slot.0.lock().expect("lock poisoned").take() else {
            return Ok(());
        };

        let mut failures = Vec::new();
        for reservation in &prepared.reservations {
            if let Some(ledger) = self.ledgers.get(&reservation.device) {
                ledger.lock().expect("lock poisoned").release(reservation.slot);
            }
            if let Err(error) = self.cdi.remove_entry(&reservation.cdi_name) {
                failures.push(ReleaseFailure {
                    device: reservation.cdi_name.clone(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(UnprepareError::PartialRelease {
                claim: claim.clone(),
                failures,
            })
        }
    }

    fn prepare_devices(&self, claim: &ResourceClaim) -> Result<PreparedClaim, PrepareError> {
        let Some(allocation) = &claim.allocation else {
            return Err(PrepareError::NoAllocation {
                claim: claim.uid.clone(),
            });
        };

        let mut devices = Vec::new();
        let mut reservations = Vec::new();
        for result in &allocation.devices {
            if result.driver != self.driver_name {
                tracing::info!(
                    claim = %claim.uid,
                    driver = %result.driver,
                    "skipping allocation result owned by another driver"
                );
                continue;
            }
            match self.prepare_device(claim, result, &mut reservations) {
                Ok(prepared) => devices.push(prepared),
                Err(err) => {
                    self.rollback(&claim.uid, &reservations);
                    return Err(err);
                }
            }
        }

        Ok(PreparedClaim {
            devices,
            reservations,
        })
    }

    fn prepare_device(
        &self,
        claim: &ResourceClaim,
        result: &DeviceAllocationResult,
        reservations: &mut Vec<Reservation>,
    ) -> Result<PreparedDevice, PrepareError> {
        let Some(device) = self.allocatable.get(&result.device) else {
            return Err(PrepareError::UnknownDevice {
                claim: claim.uid.clone(),
                device: result.device.clone(),
            });
        };

        let cdi_device_ids = match &device.sharing {
            Sharing::TimeSlicing(_) => {
                // Every consumer shares the physical device. The configured
                // interval is consumed by the Nx driver's scheduler, not by
                // identifier generation.
                self.cdi
                    .ensure_entry(&device.name, cdi::base_edits(&device.name))
                    .map_err(|source| PrepareError::Cdi {
                        claim: claim.uid.clone(),
                        device: device.name.clone(),
                        source,
                    })?
            }
            Sharing::SpacePartitioning(_) => {
                let slot = self.reserve_partition(&claim.uid, &device.name)?;
                let cdi_name = format!("{}-part{slot}", device.name);
                reservations.push(Reservation {
                    device: device.name.clone(),
                    slot,
                    cdi_name: cdi_name.clone(),
                });
                self.cdi
                    .ensure_entry(&cdi_name, cdi::partition_edits(&device.name, slot))
                    .map_err(|source| PrepareError::Cdi {
                        claim: claim.uid.clone(),
                        device: device.name.clone(),
                        source,
                    })?
            }
        };

        Ok(PreparedDevice {
            request_names: vec![result.request.clone()],
            pool_name: result.pool.clone(),
            device_name: result.device.clone(),
            cdi_device_ids,
        })
    }

    fn reserve_partition(&self, claim: &ClaimUid, device: &str) -> Result<u32, PrepareError> {
        // The ledger table is derived from the same inventory as
        // `allocatable`, so every space-partitioned device has an entry.
        let Some(ledger) = self.ledgers.get(device) else {
            return Err(PrepareError::UnknownDevice {
                claim: claim.clone(),
                device: device.to_string(),
            });
        };
        let mut ledger = ledger.lock().expect("lock poisoned");
        ledger.reserve(claim).ok_or_else(|| PrepareError::NoCapacity {
            claim: claim.clone(),
            device: device.to_string(),
            capacity: ledger.capacity,
        })
    }

    /// Undoes the reservations of a claim whose preparation failed partway.
    fn rollback(&self, claim: &ClaimUid, reservations: &[Reservation]) {
        for reservation in reservations {
            if let Some(ledger) = self.ledgers.get(&reservation.device) {
                ledger.lock().expect("lock poisoned").release(reservation.slot);
            }
            if let Err(error) = self.cdi.remove_entry(&reservation.cdi_name) {
                tracing::warn!(
                    claim = %claim,
                    device = %reservation.cdi_name,
                    %error,
                    "failed to remove CDI entry while rolling back"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use nx_config::{NxSharing, TimeSliceInterval};

    use super::*;
    use crate::claims::AllocationResult;

    fn time_sliced(name: &str) -> Device {
        Device {
            name: name.to_string(),
            sharing: NxSharing::time_slicing(TimeSliceInterval::Default)
                .resolve()
                .unwrap(),
        }
    }

    fn partitioned(name: &str, count: i64) -> Device {
        Device {
            name: name.to_string(),
            sharing: NxSharing::space_partitioning(count).resolve().unwrap(),
        }
    }

    fn state_with(devices: Vec<Device>) -> (DeviceState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cdi = Arc::new(CdiCache::new(dir.path()).unwrap());
        (DeviceState::new(devices, cdi), dir)
    }

    fn claim_for(uid: &str, devices: &[&str]) -> ResourceClaim {
        ResourceClaim {
            uid: ClaimUid::from(uid),
            namespace: "default".to_string(),
            name: format!("claim-{uid}"),
            allocation: Some(AllocationResult {
                devices: devices
                    .iter()
                    .map(|device| DeviceAllocationResult {
                        request: "nx".to_string(),
                        driver: crate::DRIVER_NAME.to_string(),
                        pool: "node-a".to_string(),
                        device: device.to_string(),
                    })
                    .collect(),
            }),
        }
    }

    #[test]
    fn time_sliced_prepare_attaches_base_ids() {
        let (state, _dir) = state_with(vec![time_sliced("nx0")]);

        let prepared = state.prepare(&claim_for("a", &["nx0"])).unwrap();
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].device_name, "nx0");
        assert_eq!(prepared[0].cdi_device_ids, vec!["ibm.com/nx=nx0".to_string()]);
        assert_eq!(prepared[0].request_names, vec!["nx".to_string()]);

        // Time slicing never limits how many claims share the device.
        for uid in ["b", "c", "d"] {
            let other = state.prepare(&claim_for(uid, &["nx0"])).unwrap();
            assert_eq!(other[0].cdi_device_ids, prepared[0].cdi_device_ids);
        }
    }

    #[test]
    fn prepare_is_idempotent_and_does_not_double_consume() {
        // Capacity of one: a second Prepare for the same claim only
        // succeeds if it takes the idempotent path instead of reserving.
        let (state, _dir) = state_with(vec![partitioned("nx0", 1)]);
        let claim = claim_for("a", &["nx0"]);

        let first = state.prepare(&claim).unwrap();
        let second = state.prepare(&claim).unwrap();
        assert_eq!(first, second);

        let err = state.prepare(&claim_for("b", &["nx0"])).unwrap_err();
        assert!(matches!(err, PrepareError::NoCapacity { capacity: 1, .. }), "got {err:?}");
    }

    #[test]
    fn prepare_without_allocation_fails() {
        let (state, _dir) = state_with(vec![time_sliced("nx0")]);
        let mut claim = claim_for("a", &["nx0"]);
        claim.allocation = None;

        assert!(matches!(
            state.prepare(&claim).unwrap_err(),
            PrepareError::NoAllocation { .. }
        ));
    }

    #[test]
    fn prepare_names_unknown_devices() {
        let (state, _dir) = state_with(vec![time_sliced("nx0")]);

        let err = state.prepare(&claim_for("a", &["nx7"])).unwrap_err();
        match err {
            PrepareError::UnknownDevice { device, .. } => assert_eq!(device, "nx7"),
            other => panic!("expected UnknownDevice, got {other:?}"),
        }
    }

    #[test]
    fn foreign_driver_results_are_skipped() {
        let (state, _dir) = state_with(vec![time_sliced("nx0")]);
        let mut claim = claim_for("a", &["nx0"]);
        if let Some(allocation) = claim.allocation.as_mut() {
            allocation.devices[0].driver = "gpu.example.com".to_string();
        }

        assert!(state.prepare(&claim).unwrap().is_empty());
    }

    #[test]
    fn partition_capacity_is_enforced_and_recovered() {
        let (state, _dir) = state_with(vec![partitioned("nx0", 2)]);

        let a = state.prepare(&claim_for("a", &["nx0"])).unwrap();
        let b = state.prepare(&claim_for("b", &["nx0"])).unwrap();
        assert_ne!(a[0].cdi_device_ids, b[0].cdi_device_ids);

        assert!(matches!(
            state.prepare(&claim_for("c", &["nx0"])).unwrap_err(),
            PrepareError::NoCapacity { .. }
        ));

        // Releasing one claim frees its slot for the next.
        state.unprepare(&ClaimUid::from("a")).unwrap();
        assert!(state.prepare(&claim_for("d", &["nx0"])).is_ok());
    }

    #[test]
    fn concurrent_prepares_never_oversubscribe() {
        let (state, _dir) = state_with(vec![partitioned("nx0", 2)]);
        let state = Arc::new(state);

        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|uid| {
                let state = Arc::clone(&state);
                thread::spawn(move || state.prepare(&claim_for(uid, &["nx0"])))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let capacity_errors = results
            .iter()
            .filter(|r| matches!(r, Err(PrepareError::NoCapacity { .. })))
            .count();
        assert_eq!(successes, 2);
        assert_eq!(capacity_errors, 1);
    }

    #[test]
    fn unprepare_is_idempotent() {
        let (state, _dir) = state_with(vec![partitioned("nx0", 2)]);
        state.prepare(&claim_for("a", &["nx0"])).unwrap();

        state.unprepare(&ClaimUid::from("a")).unwrap();
        state.unprepare(&ClaimUid::from("a")).unwrap();
        // A claim that never was bound also unprepares cleanly.
        state.unprepare(&ClaimUid::from("never-bound")).unwrap();
    }

    #[test]
    fn failed_prepare_leaves_no_binding_and_no_reservation() {
        let (state, _dir) = state_with(vec![partitioned("nx0", 1)]);

        // nx0 resolves, the second device does not; the claim must fail as
        // a whole and give back the slot it reserved for nx0.
        let err = state.prepare(&claim_for("a", &["nx0", "ghost"])).unwrap_err();
        assert!(matches!(err, PrepareError::UnknownDevice { .. }));

        let prepared = state.prepare(&claim_for("b", &["nx0"])).unwrap();
        assert_eq!(prepared.len(), 1);
    }

    #[test]
    fn zero_partition_count_uses_device_default() {
        let (state, _dir) = state_with(vec![partitioned("nx0", 0)]);

        for i in 0..DEFAULT_PARTITION_COUNT {
            state.prepare(&claim_for(&format!("claim-{i}"), &["nx0"])).unwrap();
        }
        assert!(matches!(
            state.prepare(&claim_for("one-too-many", &["nx0"])).unwrap_err(),
            PrepareError::NoCapacity { .. }
        ));
    }

    #[test]
    fn allocatable_devices_have_stable_order() {
        let (state, _dir) = state_with(vec![
            time_sliced("nx2"),
            time_sliced("nx0"),
            time_sliced("nx1"),
        ]);

        let names: Vec<_> = state.allocatable_devices().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["nx0", "nx1", "nx2"]);
        assert!(state.lookup("nx1").is_some());
        assert!(state.lookup("nx9").is_none());
    }
}
