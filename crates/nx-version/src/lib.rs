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

//! Build metadata reporting. The git commit is baked in at build time via
//! the `NX_GIT_COMMIT` environment variable (set by the release pipeline);
//! local builds report "unknown".

/// Expands to the version string of the calling crate, suffixed with the
/// git commit when one was recorded at build time.
#[macro_export]
macro_rules! version {
    () => {
        $crate::version_string(env!("CARGO_PKG_VERSION"), option_env!("NX_GIT_COMMIT"))
    };
}

pub fn version_string(pkg_version: &str, git_commit: Option<&str>) -> String {
    match git_commit {
        Some(commit) => format!("{pkg_version}+{commit}"),
        None => pkg_version.to_string(),
    }
}

/// The git commit hash recorded at build time.
pub fn git_commit() -> &'static str {
    option_env!("NX_GIT_COMMIT").unwrap_or("unknown")
}
