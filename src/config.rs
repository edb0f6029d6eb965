// Copyright 2024 Saptak Santra
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

//! World configuration

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, Result};

/// Records per chunk when no config is given
pub const DEFAULT_CHUNK_CAPACITY: usize = 1024;

/// Records per parallel batch when no batch size is given
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Tunables for a [`World`](crate::World)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Maximum records per chunk
    pub chunk_capacity: usize,
    /// Batch size used by `execute_parallel_default`
    pub default_batch_size: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            default_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl WorldConfig {
    pub fn with_chunk_capacity(mut self, chunk_capacity: usize) -> Self {
        self.chunk_capacity = chunk_capacity;
        self
    }

    pub fn with_default_batch_size(mut self, batch_size: usize) -> Self {
        self.default_batch_size = batch_size;
        self
    }

    /// Reject values the storage cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_capacity == 0 {
            return Err(EcsError::InvalidConfig(
                "chunk_capacity must be at least 1".to_string(),
            ));
        }
        if self.default_batch_size == 0 {
            return Err(EcsError::InvalidConfig(
                "default_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: WorldConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = WorldConfig::from_json(r#"{ "chunk_capacity": 128 }"#).unwrap();
        assert_eq!(config.chunk_capacity, 128);
        assert_eq!(config.default_batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = WorldConfig::from_json(r#"{ "chunk_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = WorldConfig::from_json("{ chunk_capacity: }").unwrap_err();
        assert!(matches!(err, EcsError::ConfigParse(_)));
    }
}
