//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use archetype_query::prelude::*;
//! ```

pub use crate::component::{component_id, Component, ComponentId, Phantom};
pub use crate::config::WorldConfig;
pub use crate::descriptor::QueryDescriptor;
pub use crate::entity::EntityId;
pub use crate::error::{EcsError, Result};
pub use crate::query::*;
pub use crate::query_cache::QueryCacheStats;
pub use crate::world::World;
