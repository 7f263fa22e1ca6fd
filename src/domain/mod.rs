//! Domain layer: value objects, schema/menu/setting rules and events.

pub mod aggregates;
pub mod events;
pub mod value_objects;
