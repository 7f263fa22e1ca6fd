//! Database access, one module per table.
//!
//! Functions take `&PgPool`, or `&mut PgConnection` when they run inside a
//! caller-owned transaction, and return `sqlx::Error` untouched.

pub mod data_tables;
pub mod imports;
pub mod logs;
pub mod menus;
pub mod platforms;
pub mod sales;
pub mod settings;
pub mod shops;
pub mod table_data;
pub mod users;

/// Escapes `%`, `_` and `\` so user text matches literally inside a LIKE pattern.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') { out.push('\\'); }
        out.push(c);
    }
    out
}

/// `%text%` pattern with LIKE metacharacters escaped.
pub fn contains_pattern(input: &str) -> String {
    format!("%{}%", escape_like(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(contains_pattern("abc"), "%abc%");
    }
}
