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

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How an Nx device is shared between claims.
///
/// Serialized as a plain string; an unknown string fails decoding with
/// [`ValidationError::UnknownStrategy`] rather than falling back to a
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NxSharingStrategy {
    TimeSlicing,
    SpacePartitioning,
}

impl NxSharingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NxSharingStrategy::TimeSlicing => "TimeSlicing",
            NxSharingStrategy::SpacePartitioning => "SpacePartitioning",
        }
    }
}

impl fmt::Display for NxSharingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NxSharingStrategy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TimeSlicing" => Ok(NxSharingStrategy::TimeSlicing),
            "SpacePartitioning" => Ok(NxSharingStrategy::SpacePartitioning),
            other => Err(ValidationError::UnknownStrategy(other.to_string())),
        }
    }
}

impl TryFrom<String> for NxSharingStrategy {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NxSharingStrategy> for String {
    fn from(value: NxSharingStrategy) -> String {
        value.as_str().to_string()
    }
}

/// Length class of the execution quantum handed to each consumer of a
/// time-sliced device. This is a scheduling hint for the device driver; it
/// does not change which device a claim is bound to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeSliceInterval {
    #[default]
    Default,
    Short,
    Medium,
    Long,
}

impl TimeSliceInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSliceInterval::Default => "Default",
            TimeSliceInterval::Short => "Short",
            TimeSliceInterval::Medium => "Medium",
            TimeSliceInterval::Long => "Long",
        }
    }
}

impl fmt::Display for TimeSliceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeSliceInterval {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Default" => Ok(TimeSliceInterval::Default),
            "Short" => Ok(TimeSliceInterval::Short),
            "Medium" => Ok(TimeSliceInterval::Medium),
            "Long" => Ok(TimeSliceInterval::Long),
            other => Err(ValidationError::UnknownInterval(other.to_string())),
        }
    }
}

impl TryFrom<String> for TimeSliceInterval {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeSliceInterval> for String {
    fn from(value: TimeSliceInterval) -> String {
        value.as_str().to_string()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeSlicingConfig {
    pub interval: TimeSliceInterval,
}

impl TimeSlicingConfig {
    /// The interval is a closed enum, so a decoded config is always valid;
    /// kept for symmetry with the other sub-config.
    pub fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpacePartitioningConfig {
    /// Number of partitions the device is split into. Zero means "use the
    /// device-intrinsic default", not "unlimited" and not an error.
    pub partition_count: i64,
}

impl SpacePartitioningConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.partition_count < 0 {
            return Err(ValidationError::InvalidPartitionCount(self.partition_count));
        }
        Ok(())
    }
}

/// Wire shape of the sharing settings: a strategy plus the sub-config for
/// that strategy. Exactly the sub-config selected by `strategy` must be
/// present; [`NxSharing::resolve`] turns a valid value into the [`Sharing`]
/// sum type the rest of the driver consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NxSharing {
    pub strategy: NxSharingStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_slicing_config: Option<TimeSlicingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_partitioning_config: Option<SpacePartitioningConfig>,
}

impl NxSharing {
    pub fn time_slicing(interval: TimeSliceInterval) -> Self {
        NxSharing {
            strategy: NxSharingStrategy::TimeSlicing,
            time_slicing_config: Some(TimeSlicingConfig { interval }),
            space_partitioning_config: None,
        }
    }

    pub fn space_partitioning(partition_count: i64) -> Self {
        NxSharing {
            strategy: NxSharingStrategy::SpacePartitioning,
            time_slicing_config: None,
            space_partitioning_config: Some(SpacePartitioningConfig { partition_count }),
        }
    }

    pub fn is_time_slicing(&self) -> bool {
        self.strategy == NxSharingStrategy::TimeSlicing
    }

    pub fn is_space_partitioning(&self) -> bool {
        self.strategy == NxSharingStrategy::SpacePartitioning
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.resolve().map(|_| ())
    }

    /// Validates the sharing settings and collapses them into the [`Sharing`]
    /// sum type. A missing or mismatched sub-config is the "inconsistent
    /// sharing settings" error; a well-formed decode cannot produce it, but
    /// hand-built values can.
    pub fn resolve(&self) -> Result<Sharing, ValidationError> {
        match (
            self.strategy,
            &self.time_slicing_config,
            &self.space_partitioning_config,
        ) {
            (NxSharingStrategy::TimeSlicing, Some(config), None) => {
                config.validate()?;
                Ok(Sharing::TimeSlicing(config.clone()))
            }
            (NxSharingStrategy::SpacePartitioning, None, Some(config)) => {
                config.validate()?;
                Ok(Sharing::SpacePartitioning(config.clone()))
            }
            _ => Err(ValidationError::InconsistentSharing {
                strategy: self.strategy,
            }),
        }
    }
}

/// Validated sharing settings with the strategy/sub-config mismatch class
/// eliminated by construction. This is the only sharing type the device
/// state engine sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sharing {
    TimeSlicing(TimeSlicingConfig),
    SpacePartitioning(SpacePartitioningConfig),
}

/// Top-level, versioned per-device configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NxConfig {
    pub api_version: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharing: Option<NxSharing>,
}

impl NxConfig {
    pub fn new(sharing: NxSharing) -> Self {
        NxConfig {
            api_version: crate::API_VERSION.to_string(),
            kind: crate::NX_CONFIG_KIND.to_string(),
            sharing: Some(sharing),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let Some(sharing) = &self.sharing else {
            return Err(ValidationError::NoSharingStrategy);
        };
        sharing.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_known_values() {
        assert_eq!(
            "TimeSlicing".parse::<NxSharingStrategy>().unwrap(),
            NxSharingStrategy::TimeSlicing
        );
        assert_eq!(
            "SpacePartitioning".parse::<NxSharingStrategy>().unwrap(),
            NxSharingStrategy::SpacePartitioning
        );
    }

    #[test]
    fn strategy_rejects_unknown_values() {
        let err = "BestEffort".parse::<NxSharingStrategy>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownStrategy("BestEffort".into()));
        assert_eq!(err.to_string(), "unknown Nx sharing strategy: BestEffort");
    }

    #[test]
    fn interval_rejects_unknown_values() {
        for good in ["Default", "Short", "Medium", "Long"] {
            assert!(good.parse::<TimeSliceInterval>().is_ok());
        }
        assert_eq!(
            "Tiny".parse::<TimeSliceInterval>().unwrap_err(),
            ValidationError::UnknownInterval("Tiny".into())
        );
    }

    #[test]
    fn partition_count_bounds() {
        assert_eq!(
            SpacePartitioningConfig { partition_count: -1 }
                .validate()
                .unwrap_err(),
            ValidationError::InvalidPartitionCount(-1)
        );
        assert!(SpacePartitioningConfig { partition_count: 0 }.validate().is_ok());
        assert!(SpacePartitioningConfig { partition_count: 8 }.validate().is_ok());
    }

    #[test]
    fn sharing_resolves_to_sum_type() {
        let sharing = NxSharing::time_slicing(TimeSliceInterval::Short);
        assert!(sharing.is_time_slicing());
        assert_eq!(
            sharing.resolve().unwrap(),
            Sharing::TimeSlicing(TimeSlicingConfig {
                interval: TimeSliceInterval::Short
            })
        );

        let sharing = NxSharing::space_partitioning(4);
        assert!(sharing.is_space_partitioning());
        assert_eq!(
            sharing.resolve().unwrap(),
            Sharing::SpacePartitioning(SpacePartitioningConfig { partition_count: 4 })
        );
    }

    #[test]
    fn sharing_rejects_mismatched_sub_config() {
        // Strategy says time-slicing but only a partitioning config is given.
        let sharing = NxSharing {
            strategy: NxSharingStrategy::TimeSlicing,
            time_slicing_config: None,
            space_partitioning_config: Some(SpacePartitioningConfig { partition_count: 2 }),
        };
        assert_eq!(
            sharing.validate().unwrap_err(),
            ValidationError::InconsistentSharing {
                strategy: NxSharingStrategy::TimeSlicing
            }
        );

        // Both sub-configs present is just as inconsistent.
        let sharing = NxSharing {
            strategy: NxSharingStrategy::SpacePartitioning,
            time_slicing_config: Some(TimeSlicingConfig::default()),
            space_partitioning_config: Some(SpacePartitioningConfig { partition_count: 2 }),
        };
        assert!(matches!(
            sharing.validate().unwrap_err(),
            ValidationError::InconsistentSharing { .. }
        ));
    }

    #[test]
    fn sharing_propagates_sub_config_errors() {
        let sharing = NxSharing::space_partitioning(-3);
        assert_eq!(
            sharing.validate().unwrap_err(),
            ValidationError::InvalidPartitionCount(-3)
        );
    }

    #[test]
    fn config_requires_sharing() {
        let config = NxConfig {
            api_version: crate::API_VERSION.to_string(),
            kind: crate::NX_CONFIG_KIND.to_string(),
            sharing: None,
        };
        assert_eq!(
            config.validate().unwrap_err(),
            ValidationError::NoSharingStrategy
        );
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "no sharing strategy set"
        );
    }

    #[test]
    fn valid_configs_validate() {
        assert!(
            NxConfig::new(NxSharing::time_slicing(TimeSliceInterval::Default))
                .validate()
                .is_ok()
        );
        assert!(NxConfig::new(NxSharing::space_partitioning(0)).validate().is_ok());
    }
}
