//!
//! archetype_ecs crate.
//!

mod archetype;
mod chunk;
mod component;
mod entity;
mod error;
mod query;
mod util;
mod version;
mod world;

pub mod command;

pub use self::{
    component::{Component, ComponentId, ComponentLayout, ComponentRegistry, PackWidth},
    entity::Entity,
    error::{EcsError, EcsResult},
    query::{Fetch, FetchShape, FetchSlice, IterMode, QueryBuilder, Read, Write},
    version::{ColumnVersion, WorldVersion},
    world::{StoreConfig, World},
};
