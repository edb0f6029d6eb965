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

//! Error types

use std::fmt;

use crate::component::ComponentId;

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Entity not found
    EntityNotFound,

    /// Component not found
    ComponentNotFound,

    /// Archetype not found
    ArchetypeNotFound,

    /// A query or bundle named a number of component types outside `1..=max`
    UnsupportedArity { requested: usize, max: usize },

    /// The same component type appeared twice in one query or bundle
    DuplicateComponent(ComponentId),

    /// Descriptor was built for a different world
    ForeignDescriptor,

    /// Descriptor does not include a component the callback asks for
    DescriptorMismatch(ComponentId),

    /// Configuration rejected by validation
    InvalidConfig(String),

    /// Configuration could not be parsed
    ConfigParse(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityNotFound => write!(f, "Entity not found"),
            EcsError::ComponentNotFound => write!(f, "Component not found"),
            EcsError::ArchetypeNotFound => write!(f, "Archetype not found"),
            EcsError::UnsupportedArity { requested, max } => {
                write!(f, "Unsupported arity: {requested} component types (supported 1..={max})")
            }
            EcsError::DuplicateComponent(id) => write!(f, "Duplicate component type: {id}"),
            EcsError::ForeignDescriptor => {
                write!(f, "Query descriptor belongs to a different world")
            }
            EcsError::DescriptorMismatch(id) => {
                write!(f, "Query descriptor does not include component {id}")
            }
            EcsError::InvalidConfig(msg) => write!(f, "Invalid config: {msg}"),
            EcsError::ConfigParse(msg) => write!(f, "Config parse error: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<serde_json::Error> for EcsError {
    fn from(err: serde_json::Error) -> Self {
        EcsError::ConfigParse(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_message() {
        let err = EcsError::UnsupportedArity {
            requested: 17,
            max: 16,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported arity: 17 component types (supported 1..=16)"
        );
    }
}
