//! Value Objects for the back office

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a closed set of lowercase text values stored in `TEXT` columns.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self { $($name::$variant => $text),+ }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
        }

        impl FromStr for $name {
            type Err = ParseValueError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseValueError::new(stringify!($name), s)),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseValueError;
            fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
        }
    };
}

text_enum!(
    /// Account role. Admins manage configuration; operators work with shop data.
    Role { Admin => "admin", Operator => "operator" }
);

text_enum!(ShopStatus { Active => "active", Inactive => "inactive" });

text_enum!(
    /// Type of a data table field.
    FieldType { Text => "text", Number => "number", Date => "date", Boolean => "boolean" }
);

text_enum!(
    /// What happens to existing rows of the target before an import.
    ImportMode { Append => "append", Overwrite => "overwrite" }
);

text_enum!(
    /// What happens when an imported row fails coercion or validation.
    ErrorStrategy { Skip => "skip", Abort => "abort" }
);

text_enum!(ImportStatus { Success => "success", PartialSuccess => "partial_success", Failed => "failed" });

text_enum!(ActionType { Create => "create", Update => "update", Delete => "delete" });

text_enum!(SettingValueType { String => "string", Json => "json", Number => "number", Boolean => "boolean" });

text_enum!(SortOrder { Asc => "asc", Desc => "desc" });

text_enum!(
    /// Bucket width for sales trends.
    TrendBucket { Day => "day", Week => "week", Month => "month" }
);

impl Default for ImportMode { fn default() -> Self { Self::Append } }
impl Default for ErrorStrategy { fn default() -> Self { Self::Skip } }
impl Default for SortOrder { fn default() -> Self { Self::Desc } }
impl Default for TrendBucket { fn default() -> Self { Self::Day } }
impl Default for ShopStatus { fn default() -> Self { Self::Active } }
impl Default for Role { fn default() -> Self { Self::Operator } }
impl Default for SettingValueType { fn default() -> Self { Self::String } }

impl ImportStatus {
    pub fn from_counts(total: usize, success: usize) -> Self {
        if total > 0 && success == total { Self::Success }
        else if success > 0 { Self::PartialSuccess }
        else { Self::Failed }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseValueError { kind: &'static str, value: String }

impl ParseValueError {
    fn new(kind: &'static str, value: &str) -> Self { Self { kind, value: value.to_string() } }
}

impl std::error::Error for ParseValueError {}
impl fmt::Display for ParseValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "invalid {}: {:?}", self.kind, self.value) }
}

/// Platform code value object, e.g. `taobao` or `jd`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlatformCode(String);

impl PlatformCode {
    pub fn new(value: impl Into<String>) -> Result<Self, PlatformCodeError> {
        let value = value.into().trim().to_lowercase();
        if value.is_empty() { return Err(PlatformCodeError::Empty); }
        if value.len() > 50 { return Err(PlatformCodeError::TooLong); }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(PlatformCodeError::InvalidChar);
        }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for PlatformCode {
    type Error = PlatformCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<PlatformCode> for String {
    fn from(code: PlatformCode) -> Self { code.0 }
}

impl fmt::Display for PlatformCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone)] pub enum PlatformCodeError { Empty, TooLong, InvalidChar }
impl std::error::Error for PlatformCodeError {}
impl fmt::Display for PlatformCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "platform code empty"),
            Self::TooLong => write!(f, "platform code too long"),
            Self::InvalidChar => write!(f, "platform code may only contain letters, digits, '-' and '_'"),
        }
    }
}

/// Offset pagination with a clamped page size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page { pub skip: i64, pub limit: i64 }

impl Page {
    pub fn new(skip: Option<i64>, limit: Option<i64>, default_limit: i64, max_limit: i64) -> Self {
        Self {
            skip: skip.unwrap_or(0).max(0),
            limit: limit.unwrap_or(default_limit).clamp(1, max_limit),
        }
    }

    /// Converts 1-based `page` / `page_size` parameters.
    pub fn from_page(page: Option<i64>, page_size: Option<i64>, default_size: i64, max_size: i64) -> Self {
        let limit = page_size.unwrap_or(default_size).clamp(1, max_size);
        let page = page.unwrap_or(1).max(1);
        Self { skip: (page - 1).saturating_mul(limit), limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_code() {
        let code = PlatformCode::new("  TaoBao ").unwrap();
        assert_eq!(code.as_str(), "taobao");
        assert!(matches!(PlatformCode::new(""), Err(PlatformCodeError::Empty)));
        assert!(matches!(PlatformCode::new("tao bao"), Err(PlatformCodeError::InvalidChar)));
    }

    #[test]
    fn test_text_enum_round_trip_names() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(ImportStatus::PartialSuccess.as_str(), "partial_success");
        assert_eq!(serde_json::to_string(&FieldType::Boolean).unwrap(), "\"boolean\"");
        assert!("manager".parse::<Role>().is_err());
    }

    #[test]
    fn test_import_status_from_counts() {
        assert_eq!(ImportStatus::from_counts(3, 3), ImportStatus::Success);
        assert_eq!(ImportStatus::from_counts(3, 1), ImportStatus::PartialSuccess);
        assert_eq!(ImportStatus::from_counts(3, 0), ImportStatus::Failed);
        assert_eq!(ImportStatus::from_counts(0, 0), ImportStatus::Failed);
    }

    #[test]
    fn test_page_clamps() {
        assert_eq!(Page::new(Some(-5), Some(1000), 100, 500), Page { skip: 0, limit: 500 });
        assert_eq!(Page::from_page(Some(3), Some(50), 50, 500), Page { skip: 100, limit: 50 });
        assert_eq!(Page::from_page(Some(0), None, 50, 500), Page { skip: 0, limit: 50 });
    }

    #[test]
    fn test_huge_page_saturates() {
        let page = Page::from_page(Some(i64::MAX), Some(50), 50, 500);
        assert_eq!(page, Page { skip: i64::MAX, limit: 50 });
        assert!(Page::from_page(Some(i64::MAX), Some(i64::MAX), 50, 500).skip > 0);
    }
}
