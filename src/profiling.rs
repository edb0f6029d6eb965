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

//! # Profiling
//!
//! With the `profiling` feature enabled, the query cache and the execution
//! engine emit `tracing` spans:
//!
//! * `query_cache.miss` (arity, key) around descriptor construction
//! * `query.execute_sequential` (arity, archetypes, records)
//! * `query.execute_parallel` / `query.try_execute_parallel` (arity, batches, records)
//! * `world.spawn_batch` (archetype)
//!
//! plus `debug` events for archetype creation and cache insertions.
//!
//! ```ignore
//! archetype_query::profiling::init_tracing(TraceFormat::Pretty)?;
//! world.execute_parallel::<(Position, Velocity), _>(&integrate, None, 256)?;
//! ```
//!
//! Filtering follows `RUST_LOG`, e.g. `RUST_LOG=archetype_query=debug`.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::error::{EcsError, Result};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraceFormat {
    /// Human readable, one line per event
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Install a global subscriber printing spans and events to stdout.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(format: TraceFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(filter);

    let installed = match format {
        TraceFormat::Pretty => registry.with(fmt::layer()).try_init(),
        TraceFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    installed.map_err(|err| EcsError::InvalidConfig(format!("tracing subscriber: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_fails() {
        // Only this test installs a subscriber in the unit test binary
        assert!(init_tracing(TraceFormat::Json).is_ok());
        assert!(matches!(
            init_tracing(TraceFormat::Pretty),
            Err(EcsError::InvalidConfig(_))
        ));
    }
}
