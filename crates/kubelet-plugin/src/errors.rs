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

use itertools::Itertools;

use crate::cdi::CdiError;
use crate::claims::ClaimUid;

/// Per-claim preparation failures. Every variant names the claim (and the
/// device where one is involved) so batch results stay attributable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrepareError {
    /// The orchestrator handed us a claim without an allocation decision.
    /// That is an orchestration invariant violation, not a transient
    /// condition.
    #[error("claim {claim} has no allocation result")]
    NoAllocation { claim: ClaimUid },

    #[error("claim {claim} references device {device:?} which is not in the node inventory")]
    UnknownDevice { claim: ClaimUid, device: String },

    /// All partition slots of a space-partitioned device are reserved.
    /// Retryable: capacity frees up when another claim is unprepared.
    #[error("no free partition on device {device:?} for claim {claim} (capacity {capacity})")]
    NoCapacity {
        claim: ClaimUid,
        device: String,
        capacity: u32,
    },

    #[error("CDI spec handling failed for claim {claim}, device {device:?}: {source}")]
    Cdi {
        claim: ClaimUid,
        device: String,
        #[source]
        source: CdiError,
    },

    /// The spec cache could not be refreshed at batch start. Staleness can
    /// no longer be bounded, so every claim in the batch fails with this.
    #[error("claim {claim} not prepared, CDI spec cache refresh failed: {source}")]
    CacheRefresh {
        claim: ClaimUid,
        #[source]
        source: CdiError,
    },
}

/// A device release that failed while unpreparing a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    pub device: String,
    pub error: CdiError,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnprepareError {
    /// Some devices failed to release. The claim binding has still been
    /// removed; this error exists for observability, not for retry.
    #[error("claim {claim}: failed to release {}", .failures.iter().map(|f| format!("{:?} ({})", f.device, f.error)).join(", "))]
    PartialRelease {
        claim: ClaimUid,
        failures: Vec<ReleaseFailure>,
    },
}
