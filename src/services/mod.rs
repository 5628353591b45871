// Catalogue and stock
pub mod branches;
pub mod inventory;
pub mod products;

// Reporting
pub mod analytics;
pub mod chatbot;

// Accounts
pub mod users;

// Spreadsheet ingestion
pub mod import;
pub mod uploads;

use sea_orm::sea_query::LikeExpr;

/// Escapes `LIKE` wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Substring match for a user-supplied search term.
pub(crate) fn contains_literal(term: &str) -> LikeExpr {
    LikeExpr::new(format!("%{}%", escape_like(term))).escape('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("AC-15"), "AC-15");
        assert_eq!(escape_like("50%"), "50\\%");
        assert_eq!(escape_like("AC_1"), "AC\\_1");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
