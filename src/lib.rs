// ============================================================================
// memomapper Library
// ============================================================================
//
// A data mapper core: explicitly declared models and properties, a
// typecast/validation engine, an identity map per repository, and the
// persistence state machine (transient, clean, dirty, deleted, immutable)
// that decides what reaches the store and when.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod identity_map;
pub mod model;
pub mod property;
pub mod repository;
pub mod resource;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use config::MapperConfig;
pub use core::{InvalidValueError, KeyTuple, MapperError, Primitive, Result, Value};
pub use identity_map::IdentityMap;
pub use model::{Model, ModelBuilder, ModelRegistry, Relationship, RelationshipSpec};
pub use property::{
    DefaultValue, Kind, OptionName, OptionValue, Property, PropertySpec, TypeRegistry, Visibility,
};
pub use repository::Repository;
pub use resource::{Resource, ResourceId};
pub use state::{PersistenceState, StateKind, StateRef};
pub use store::{MemoryStore, ReadRequest, Record, ScopeFilter, Store, StoreStats};
