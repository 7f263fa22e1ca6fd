//! System setting value checks

use thiserror::Error;

use crate::domain::aggregates::data_table::{parse_bool, parse_number};
use crate::domain::value_objects::SettingValueType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("value {value:?} is not a valid {value_type}")]
pub struct SettingValueError { pub value_type: SettingValueType, pub value: String }

/// A stored value must parse as its declared type. `None` is always allowed.
pub fn check_value(value_type: SettingValueType, value: Option<&str>) -> Result<(), SettingValueError> {
    let Some(value) = value else { return Ok(()) };
    let ok = match value_type {
        SettingValueType::String => true,
        SettingValueType::Number => parse_number(value).is_some(),
        SettingValueType::Boolean => parse_bool(value).is_some(),
        SettingValueType::Json => serde_json::from_str::<serde_json::Value>(value).is_ok(),
    };
    if ok { Ok(()) } else { Err(SettingValueError { value_type, value: value.to_string() }) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert!(check_value(SettingValueType::Number, Some("42")).is_ok());
        assert!(check_value(SettingValueType::Number, Some("forty")).is_err());
        assert!(check_value(SettingValueType::Json, Some(r#"{"theme":"dark"}"#)).is_ok());
        assert!(check_value(SettingValueType::Json, Some("{oops")).is_err());
        assert!(check_value(SettingValueType::Boolean, None).is_ok());
    }
}
