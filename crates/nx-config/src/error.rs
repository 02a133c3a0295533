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

use crate::types::NxSharingStrategy;

/// Reasons an `NxConfig` (or one of its parts) is rejected. A configuration
/// that fails validation is never silently corrected or defaulted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown Nx sharing strategy: {0}")]
    UnknownStrategy(String),
    #[error("unknown time-slice interval: {0}")]
    UnknownInterval(String),
    #[error("invalid partition count: {0}")]
    InvalidPartitionCount(i64),
    #[error("inconsistent Nx sharing settings: strategy {strategy} does not match the sharing config provided")]
    InconsistentSharing { strategy: NxSharingStrategy },
    #[error("no sharing strategy set")]
    NoSharingStrategy,
}

/// Errors turning raw bytes into an accepted [`crate::NxConfig`]. Decoding is
/// strict: unknown fields, kinds and API versions are rejected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed NxConfig document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported API version {found:?}, this build supports {expected:?}")]
    UnsupportedVersion { found: String, expected: &'static str },
    #[error("unsupported kind {found:?}, expected {expected:?}")]
    UnsupportedKind { found: String, expected: &'static str },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
