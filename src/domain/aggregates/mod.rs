//! Aggregates module
pub mod data_table;
pub mod menu;
pub mod setting;

pub use data_table::{FieldConfig, FieldViolation, JsonMap, SchemaError};
pub use menu::MenuNode;
pub use setting::SettingValueError;
