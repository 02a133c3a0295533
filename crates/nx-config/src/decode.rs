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

//! Strict decoding of versioned `NxConfig` documents.
//!
//! Should a newer version of the configuration API become necessary,
//! conversion from older versions can be added here while `decode_config`
//! keeps rejecting versions it does not know about.

use crate::error::DecodeError;
use crate::types::NxConfig;

/// Checks the group/version/kind header of an already-deserialized document.
/// Split out from [`decode_config`] so configuration embedded in other files
/// (for example the plugin config) goes through the same gate.
pub fn validate_document(config: &NxConfig) -> Result<(), DecodeError> {
    if config.api_version != crate::API_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            found: config.api_version.clone(),
            expected: crate::API_VERSION,
        });
    }
    if config.kind != crate::NX_CONFIG_KIND {
        return Err(DecodeError::UnsupportedKind {
            found: config.kind.clone(),
            expected: crate::NX_CONFIG_KIND,
        });
    }
    Ok(())
}

/// Decodes raw bytes into a validated [`NxConfig`]. Unknown fields, unknown
/// kinds, unknown API versions and invalid sharing settings are all rejected.
pub fn decode_config(bytes: &[u8]) -> Result<NxConfig, DecodeError> {
    let config: NxConfig = serde_json::from_slice(bytes)?;
    validate_document(&config)?;
    config.validate()?;
    Ok(config)
}

/// Inverse of [`decode_config`]; output round-trips through it unchanged.
pub fn encode_config(config: &NxConfig) -> Result<Vec<u8>, DecodeError> {
    Ok(serde_json::to_vec_pretty(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NxSharing, TimeSliceInterval};
    use crate::{DecodeError, ValidationError};

    #[test]
    fn decodes_time_slicing_document() {
        let doc = br#"{
            "apiVersion": "device.power.ibm.com/v1alpha1",
            "kind": "NxConfig",
            "sharing": {
                "strategy": "TimeSlicing",
                "timeSlicingConfig": {"interval": "Medium"}
            }
        }"#;
        let config = decode_config(doc).unwrap();
        let sharing = config.sharing.unwrap();
        assert_eq!(
            sharing,
            NxSharing::time_slicing(TimeSliceInterval::Medium)
        );
    }

    #[test]
    fn decodes_space_partitioning_document() {
        let doc = br#"{
            "apiVersion": "device.power.ibm.com/v1alpha1",
            "kind": "NxConfig",
            "sharing": {
                "strategy": "SpacePartitioning",
                "spacePartitioningConfig": {"partitionCount": 4}
            }
        }"#;
        let config = decode_config(doc).unwrap();
        assert_eq!(config.sharing.unwrap(), NxSharing::space_partitioning(4));
    }

    #[test]
    fn rejects_unknown_fields() {
        let doc = br#"{
            "apiVersion": "device.power.ibm.com/v1alpha1",
            "kind": "NxConfig",
            "sharing": {
                "strategy": "TimeSlicing",
                "timeSlicingConfig": {"interval": "Short"},
                "burstConfig": {}
            }
        }"#;
        assert!(matches!(
            decode_config(doc).unwrap_err(),
            DecodeError::Malformed(_)
        ));
    }

    #[test]
    fn rejects_unknown_strategy_string() {
        let doc = br#"{
            "apiVersion": "device.power.ibm.com/v1alpha1",
            "kind": "NxConfig",
            "sharing": {"strategy": "RoundRobin"}
        }"#;
        let err = decode_config(doc).unwrap_err();
        assert!(
            err.to_string().contains("unknown Nx sharing strategy: RoundRobin"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn rejects_unknown_version_and_kind() {
        let doc = br#"{"apiVersion": "device.power.ibm.com/v2", "kind": "NxConfig"}"#;
        assert!(matches!(
            decode_config(doc).unwrap_err(),
            DecodeError::UnsupportedVersion { .. }
        ));

        let doc = br#"{"apiVersion": "device.power.ibm.com/v1alpha1", "kind": "GzipConfig"}"#;
        assert!(matches!(
            decode_config(doc).unwrap_err(),
            DecodeError::UnsupportedKind { .. }
        ));
    }

    #[test]
    fn rejects_missing_sharing() {
        let doc = br#"{"apiVersion": "device.power.ibm.com/v1alpha1", "kind": "NxConfig"}"#;
        assert!(matches!(
            decode_config(doc).unwrap_err(),
            DecodeError::Validation(ValidationError::NoSharingStrategy)
        ));
    }

    #[test]
    fn round_trip_validates_identically() {
        for sharing in [
            NxSharing::time_slicing(TimeSliceInterval::Long),
            NxSharing::space_partitioning(0),
            NxSharing::space_partitioning(8),
        ] {
            let config = crate::NxConfig::new(sharing);
            let bytes = encode_config(&config).unwrap();
            let decoded = decode_config(&bytes).unwrap();
            assert_eq!(decoded, config);
            assert_eq!(
                decoded.sharing.as_ref().unwrap().resolve().unwrap(),
                config.sharing.as_ref().unwrap().resolve().unwrap()
            );
        }
    }
}
