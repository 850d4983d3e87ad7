//! Query options and SQL rendering
//!
//! [`QueryOptions`] is the logical description of what a read or write touches:
//! projected fields, filters, ordering and pagination. It renders into SQL with generic
//! `?` placeholders (rewritten per dialect later) and produces the fingerprint that
//! addresses the view cache.

use super::error::{DatabaseError, Result};
use super::value::{encode_bytes, DatabaseValue, Record};

/// SQL comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal to (=)
    Eq,
    /// Not equal to (!=)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// LIKE pattern matching
    Like,
    /// IN set membership
    In,
    /// IS NULL
    IsNull,
    /// IS NOT NULL
    IsNotNull,
}

impl Operator {
    fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Operator::Eq => 0,
            Operator::Ne => 1,
            Operator::Lt => 2,
            Operator::Le => 3,
            Operator::Gt => 4,
            Operator::Ge => 5,
            Operator::Like => 6,
            Operator::In => 7,
            Operator::IsNull => 8,
            Operator::IsNotNull => 9,
        }
    }
}

/// WHERE clause condition
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    column: String,
    operator: Operator,
    values: Vec<DatabaseValue>,
}

impl Condition {
    fn render(&self, sql: &mut String, params: &mut Vec<DatabaseValue>) {
        match self.operator {
            Operator::IsNull | Operator::IsNotNull => {
                sql.push_str(&format!("{} {}", self.column, self.operator.as_sql()));
            }
            // IN () is not valid SQL; an empty set matches nothing
            Operator::In if self.values.is_empty() => sql.push_str("1 = 0"),
            Operator::In => {
                let placeholders = vec!["?"; self.values.len()].join(", ");
                sql.push_str(&format!("{} IN ({})", self.column, placeholders));
                params.extend(self.values.iter().cloned());
            }
            _ => {
                sql.push_str(&format!("{} {} ?", self.column, self.operator.as_sql()));
                params.extend(self.values.iter().cloned());
            }
        }
    }
}

/// ORDER BY direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// Ascending order
    Asc,
    /// Descending order
    Desc,
}

impl OrderDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Which read produced a cached view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Multi-row read
    List,
    /// Single-row read
    Get,
}

/// Logical query options for reads and filtered writes
///
/// ```
/// use rust_ark::core::QueryOptions;
///
/// let (sql, params) = QueryOptions::new()
///     .fields(&["id", "name"])
///     .where_eq("status", "active")
///     .order_by_asc("name")
///     .limit(10)
///     .select_sql("users");
///
/// assert_eq!(sql, "SELECT id, name FROM users WHERE status = ? ORDER BY name ASC LIMIT 10");
/// assert_eq!(params.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    fields: Vec<String>,
    conditions: Vec<Condition>,
    order_by: Vec<(String, OrderDirection)>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl QueryOptions {
    /// Create empty options (all columns, no filter)
    pub fn new() -> Self {
        Self::default()
    }

    /// Select specific columns
    #[must_use]
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    fn condition(mut self, column: &str, operator: Operator, values: Vec<DatabaseValue>) -> Self {
        self.conditions.push(Condition {
            column: column.to_string(),
            operator,
            values,
        });
        self
    }

    /// Add a WHERE column = value condition
    #[must_use]
    pub fn where_eq(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.condition(column, Operator::Eq, vec![value.into()])
    }

    /// Add a WHERE column != value condition
    #[must_use]
    pub fn where_ne(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.condition(column, Operator::Ne, vec![value.into()])
    }

    /// Add a WHERE column > value condition
    #[must_use]
    pub fn where_gt(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.condition(column, Operator::Gt, vec![value.into()])
    }

    /// Add a WHERE column >= value condition
    #[must_use]
    pub fn where_ge(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.condition(column, Operator::Ge, vec![value.into()])
    }

    /// Add a WHERE column < value condition
    #[must_use]
    pub fn where_lt(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.condition(column, Operator::Lt, vec![value.into()])
    }

    /// Add a WHERE column <= value condition
    #[must_use]
    pub fn where_le(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.condition(column, Operator::Le, vec![value.into()])
    }

    /// Add a WHERE column LIKE pattern condition
    #[must_use]
    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.condition(column, Operator::Like, vec![pattern.into()])
    }

    /// Add a WHERE column IN (...) condition
    #[must_use]
    pub fn where_in<V: Into<DatabaseValue>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.condition(column, Operator::In, values)
    }

    /// Add a WHERE column IS NULL condition
    #[must_use]
    pub fn where_null(self, column: &str) -> Self {
        self.condition(column, Operator::IsNull, Vec::new())
    }

    /// Add a WHERE column IS NOT NULL condition
    #[must_use]
    pub fn where_not_null(self, column: &str) -> Self {
        self.condition(column, Operator::IsNotNull, Vec::new())
    }

    /// Add ORDER BY clause
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by.push((column.to_string(), direction));
        self
    }

    /// Add ORDER BY ASC
    #[must_use]
    pub fn order_by_asc(self, column: &str) -> Self {
        self.order_by(column, OrderDirection::Asc)
    }

    /// Add ORDER BY DESC
    #[must_use]
    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, OrderDirection::Desc)
    }

    /// Add LIMIT clause
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add OFFSET clause
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Options for a single-row read: keeps an explicit limit, otherwise LIMIT 1
    pub fn first(&self) -> QueryOptions {
        let mut options = self.clone();
        options.limit.get_or_insert(1);
        options
    }

    /// Deterministic cache key for a read of `table` with these options.
    ///
    /// Identical options always produce identical bytes. Every component is tagged
    /// and length prefixed, so distinct queries never share a key.
    pub fn fingerprint(&self, kind: ViewKind, table: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.push(match kind {
            ViewKind::List => b'L',
            ViewKind::Get => b'G',
        });
        encode_bytes(table.as_bytes(), &mut out);

        out.extend_from_slice(&(self.fields.len() as u64).to_be_bytes());
        for field in &self.fields {
            encode_bytes(field.as_bytes(), &mut out);
        }

        out.extend_from_slice(&(self.conditions.len() as u64).to_be_bytes());
        for cond in &self.conditions {
            encode_bytes(cond.column.as_bytes(), &mut out);
            out.push(cond.operator.tag());
            out.extend_from_slice(&(cond.values.len() as u64).to_be_bytes());
            for value in &cond.values {
                value.encode_key(&mut out);
            }
        }

        out.extend_from_slice(&(self.order_by.len() as u64).to_be_bytes());
        for (column, direction) in &self.order_by {
            encode_bytes(column.as_bytes(), &mut out);
            out.push(match direction {
                OrderDirection::Asc => 0,
                OrderDirection::Desc => 1,
            });
        }

        for bound in [self.limit, self.offset] {
            match bound {
                Some(n) => {
                    out.push(1);
                    out.extend_from_slice(&(n as u64).to_be_bytes());
                }
                None => out.push(0),
            }
        }

        out
    }

    fn render_where(&self, sql: &mut String, params: &mut Vec<DatabaseValue>) {
        if self.conditions.is_empty() {
            return;
        }

        sql.push_str(" WHERE ");
        for (i, cond) in self.conditions.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            cond.render(sql, params);
        }
    }

    /// Render a SELECT statement and its parameters
    pub fn select_sql(&self, table: &str) -> (String, Vec<DatabaseValue>) {
        let columns = if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields.join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", columns, table);
        let mut params = Vec::new();
        self.render_where(&mut sql, &mut params);

        if !self.order_by.is_empty() {
            let clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|(col, dir)| format!("{} {}", col, dir.as_sql()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", clauses.join(", ")));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        (sql, params)
    }

    /// Render an UPDATE statement (SET values followed by WHERE values)
    pub fn update_sql(&self, table: &str, record: &Record) -> Result<(String, Vec<DatabaseValue>)> {
        if record.is_empty() {
            return Err(DatabaseError::query(format!(
                "update of {} has no columns to set",
                table
            )));
        }

        let set_clauses: Vec<String> = record
            .columns()
            .iter()
            .map(|col| format!("{} = ?", col))
            .collect();

        let mut sql = format!("UPDATE {} SET {}", table, set_clauses.join(", "));
        let mut params = record.values().to_vec();
        self.render_where(&mut sql, &mut params);

        Ok((sql, params))
    }

    /// Render a DELETE statement
    pub fn delete_sql(&self, table: &str) -> (String, Vec<DatabaseValue>) {
        let mut sql = format!("DELETE FROM {}", table);
        let mut params = Vec::new();
        self.render_where(&mut sql, &mut params);
        (sql, params)
    }
}

/// Render an INSERT statement for a record
pub fn insert_sql(table: &str, record: &Record) -> Result<(String, Vec<DatabaseValue>)> {
    if record.is_empty() {
        return Err(DatabaseError::query(format!(
            "insert into {} has no columns",
            table
        )));
    }

    let placeholders = vec!["?"; record.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        record.columns().join(", "),
        placeholders
    );

    Ok((sql, record.values().to_vec()))
}
