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

//! DRA kubelet plugin for IBM Power Nx accelerators.
//!
//! The registration helper (owned by the host runtime) invokes the batched
//! prepare/unprepare callbacks on [`driver::Driver`]; everything below that
//! is node-local device state and the CDI spec cache.

pub mod cdi;
pub mod cfg;
pub mod claims;
pub mod command_line;
pub mod device_state;
pub mod discovery;
pub mod driver;
pub mod errors;
pub mod instrumentation;

/// Driver name the orchestrator routes allocation results by.
pub const DRIVER_NAME: &str = "nx.device.power.ibm.com";
