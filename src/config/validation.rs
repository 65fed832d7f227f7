// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration validation.
//!
//! Checks run in order and stop at the first violation:
//! 1. at least one pooler is configured
//! 2. every pooler has a DSN
//! 3. no two poolers share the same `extra_labels`, since labels are what
//!    distinguishes their metrics

use log::debug;

use super::types::{Config, PoolerConfig};

/// Validation error for structural configuration problems.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no pooler instance configured")]
    NoPoolers,

    #[error("the DSN is required")]
    DsnRequired,

    #[error(
        "extra_labels configured for each pooler must be unique \
         (poolers #{first} and #{second} have the same labels)"
    )]
    DuplicateExtraLabels { first: usize, second: usize },
}

/// Validate a single pooler. The DSN is only checked for presence.
pub fn validate_pooler(pooler: &PoolerConfig) -> Result<(), ValidationError> {
    if pooler.dsn().is_empty() {
        return Err(ValidationError::DsnRequired);
    }
    Ok(())
}

/// Validate the whole configuration.
pub fn validate_config(config: &Config) -> Result<(), ValidationError> {
    let poolers = config.poolers();

    if poolers.is_empty() {
        return Err(ValidationError::NoPoolers);
    }

    for pooler in poolers {
        pooler.validate()?;
    }

    for (first, a) in poolers.iter().enumerate() {
        for (offset, b) in poolers[first + 1..].iter().enumerate() {
            if a.extra_labels() == b.extra_labels() {
                return Err(ValidationError::DuplicateExtraLabels {
                    first,
                    second: first + 1 + offset,
                });
            }
        }
    }

    debug!("Configuration is valid ({} pooler(s))", poolers.len());
    Ok(())
}
