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

//! The `device.power.ibm.com/v1alpha1` configuration API group.
//!
//! An [`NxConfig`] document describes how a single Nx accelerator is shared
//! between resource claims: either time-sliced across all consumers, or
//! split into a bounded number of concurrently usable partitions.

mod decode;
mod error;
mod types;

pub use decode::{decode_config, encode_config, validate_document};
pub use error::{DecodeError, ValidationError};
pub use types::{
    NxConfig, NxSharing, NxSharingStrategy, Sharing, SpacePartitioningConfig, TimeSliceInterval,
    TimeSlicingConfig,
};

pub const GROUP_NAME: &str = "device.power.ibm.com";
pub const VERSION: &str = "v1alpha1";
pub const NX_CONFIG_KIND: &str = "NxConfig";

/// The `apiVersion` value every accepted document must carry.
pub const API_VERSION: &str = "device.power.ibm.com/v1alpha1";
