//! Positional placeholder rewriting
//!
//! Queries are written with generic `?` placeholders. Backends that number their
//! parameters (`$1`, `$2`, ...) get the query rewritten here; backends that accept `?`
//! natively get it back untouched.

use std::borrow::Cow;

/// Placeholder prefix used by a dialect when numbering parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placeholder(&'static str);

impl Placeholder {
    /// `$1, $2, ...` (PostgreSQL, Redshift)
    pub const DOLLAR: Placeholder = Placeholder("$");

    /// Native `?` placeholders (SQLite)
    pub const QUESTION: Placeholder = Placeholder("?");

    /// Create a placeholder with a custom prefix token
    pub const fn new(token: &'static str) -> Self {
        Placeholder(token)
    }

    /// The prefix token
    pub fn token(&self) -> &'static str {
        self.0
    }

    /// Whether queries pass through unchanged
    pub fn is_native(&self) -> bool {
        self.0.is_empty() || self.0 == "?"
    }

    /// Rewrite `?` placeholders into `<token><n>`.
    ///
    /// `??` is an escaped literal `?` and is not counted. Parameters are numbered from
    /// 1 in left-to-right order.
    ///
    /// ```
    /// use rust_ark::core::Placeholder;
    ///
    /// let sql = Placeholder::DOLLAR.rewrite("? = ? and ?? = ?");
    /// assert_eq!(sql, "$1 = $2 and ? = $3");
    /// ```
    pub fn rewrite<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        if self.is_native() || !sql.contains('?') {
            return Cow::Borrowed(sql);
        }

        let mut out = String::with_capacity(sql.len() + 8);
        let mut rest = sql;
        let mut n = 0usize;

        while let Some(pos) = rest.find('?') {
            out.push_str(&rest[..pos]);
            if rest[pos + 1..].starts_with('?') {
                out.push('?');
                rest = &rest[pos + 2..];
            } else {
                n += 1;
                out.push_str(self.0);
                out.push_str(&n.to_string());
                rest = &rest[pos + 1..];
            }
        }

        out.push_str(rest);
        Cow::Owned(out)
    }
}

impl Default for Placeholder {
    fn default() -> Self {
        Placeholder::QUESTION
    }
}

impl std::fmt::Display for Placeholder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_numbers_in_order() {
        let sql = Placeholder::DOLLAR.rewrite("? = ? and ?? = ?");
        assert_eq!(sql, "$1 = $2 and ? = $3");
    }

    #[test]
    fn test_rewrite_native_is_identity() {
        let input = "SELECT * FROM t WHERE a = ? AND b ?? c";
        assert_eq!(Placeholder::QUESTION.rewrite(input), input);
        assert_eq!(Placeholder::new("").rewrite(input), input);
        assert!(matches!(Placeholder::new("").rewrite(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_rewrite_without_placeholders_borrows() {
        let sql = Placeholder::DOLLAR.rewrite("SELECT 1");
        assert!(matches!(sql, Cow::Borrowed("SELECT 1")));
    }

    #[test]
    fn test_rewrite_edges() {
        assert_eq!(Placeholder::DOLLAR.rewrite("?"), "$1");
        assert_eq!(Placeholder::DOLLAR.rewrite("??"), "?");
        assert_eq!(Placeholder::DOLLAR.rewrite("???"), "?$1");
        assert_eq!(Placeholder::DOLLAR.rewrite("a??"), "a?");
        assert_eq!(Placeholder::DOLLAR.rewrite("x = ?;"), "x = $1;");
    }

    #[test]
    fn test_rewrite_multichar_token() {
        let sql = Placeholder::new(":p").rewrite("INSERT INTO t (a, b) VALUES (?, ?)");
        assert_eq!(sql, "INSERT INTO t (a, b) VALUES (:p1, :p2)");
    }

    #[test]
    fn test_rewrite_double_digit_counter() {
        let input = vec!["?"; 12].join(",");
        let sql = Placeholder::DOLLAR.rewrite(&input);
        assert!(sql.ends_with("$11,$12"));
    }
}
