// Query builder: converts core adapter types into SQL fragments.
//
// Generates dynamic SQL with positional bind parameters ($1, $2, ...) for
// `sqlx::query()`. Bind values are coerced using the column types declared in
// the table schema, so a JSON `12` bound to a REAL column stays a float.

use routemarket_core::db::adapter::{Connector, FindManyQuery, Operator, SortDirection, WhereClause};
use routemarket_core::db::schema::{FieldType, TableSchema};

use crate::schema::DatabaseType;

/// Typed bind value with no borrowed data.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl BindValue {
    /// Convert a JSON value, honouring the declared column type when known.
    pub fn from_json(value: &serde_json::Value, field_type: Option<FieldType>) -> Self {
        match value {
            serde_json::Value::Null => BindValue::Null,
            serde_json::Value::Bool(b) => BindValue::Bool(*b),
            serde_json::Value::Number(n) => match field_type {
                Some(FieldType::Number) => n.as_f64().map(BindValue::Float).unwrap_or(BindValue::Null),
                Some(FieldType::Integer) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .map(BindValue::Int)
                    .unwrap_or(BindValue::Null),
                _ => {
                    if let Some(i) = n.as_i64() {
                        BindValue::Int(i)
                    } else if let Some(f) = n.as_f64() {
                        BindValue::Float(f)
                    } else {
                        BindValue::Text(n.to_string())
                    }
                }
            },
            serde_json::Value::String(s) => BindValue::Text(s.clone()),
            other => BindValue::Text(other.to_string()),
        }
    }
}

/// A built SQL fragment with its bind values.
#[derive(Debug, Clone)]
pub struct SqlFragment {
    /// The SQL string with $N placeholders.
    pub sql: String,
    /// The bind values in order.
    pub binds: Vec<BindValue>,
}

impl SqlFragment {
    pub fn empty() -> Self {
        Self {
            sql: String::new(),
            binds: Vec::new(),
        }
    }
}

fn field_type(table: Option<&TableSchema>, column: &str) -> Option<FieldType> {
    table?
        .fields
        .iter()
        .find(|f| f.name == column)
        .map(|f| f.field_type)
}

/// Build a WHERE clause from a slice of `WhereClause`.
///
/// Returns the SQL fragment starting with " WHERE ..." and the bind values.
/// If the slice is empty, returns an empty fragment.
pub fn build_where(clauses: &[WhereClause], bind_offset: usize, table: Option<&TableSchema>) -> SqlFragment {
    if clauses.is_empty() {
        return SqlFragment::empty();
    }

    let mut sql = String::from(" WHERE ");
    let mut binds = Vec::new();
    let mut param_idx = bind_offset + 1;

    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            // The connector is set on the *previous* clause (`.and()` / `.or()`)
            let connector = clauses[i - 1].connector.unwrap_or(Connector::And);
            match connector {
                Connector::And => sql.push_str(" AND "),
                Connector::Or => sql.push_str(" OR "),
            }
        }

        let quoted_field = quote_identifier(&clause.field);
        let ty = field_type(table, &clause.field);

        let op = match clause.operator {
            Operator::Eq if clause.value.is_null() => {
                sql.push_str(&format!("{quoted_field} IS NULL"));
                continue;
            }
            Operator::Ne if clause.value.is_null() => {
                sql.push_str(&format!("{quoted_field} IS NOT NULL"));
                continue;
            }
            Operator::In => {
                let values = match clause.value.as_array() {
                    Some(arr) => arr.clone(),
                    None => vec![clause.value.clone()],
                };
                if values.is_empty() {
                    // IN () is invalid SQL; an empty list matches nothing.
                    sql.push_str("1 = 0");
                    continue;
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| {
                        let p = format!("${param_idx}");
                        binds.push(BindValue::from_json(v, ty));
                        param_idx += 1;
                        p
                    })
                    .collect();
                sql.push_str(&format!("{quoted_field} IN ({})", placeholders.join(", ")));
                continue;
            }
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
        };

        sql.push_str(&format!("{quoted_field} {op} ${param_idx}"));
        binds.push(BindValue::from_json(&clause.value, ty));
        param_idx += 1;
    }

    SqlFragment { sql, binds }
}

/// Build an ORDER BY clause from a `FindManyQuery`.
pub fn build_order_by(query: &FindManyQuery) -> String {
    match &query.sort_by {
        Some(sort) => {
            let dir = match sort.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!(" ORDER BY {} {}", quote_identifier(&sort.field), dir)
        }
        None => String::new(),
    }
}

/// Build LIMIT and OFFSET clauses.
pub fn build_limit_offset(query: &FindManyQuery, db_type: DatabaseType) -> String {
    let mut sql = String::new();
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit.max(0)));
    } else if query.offset.is_some() {
        // SQLite requires LIMIT before OFFSET.
        match db_type {
            DatabaseType::Sqlite => sql.push_str(" LIMIT -1"),
            DatabaseType::Postgres => sql.push_str(" LIMIT ALL"),
        }
    }
    if let Some(offset) = query.offset {
        sql.push_str(&format!(" OFFSET {}", offset.max(0)));
    }
    sql
}

/// Build an INSERT statement.
pub fn build_insert(table_name: &str, data: &serde_json::Value, table: Option<&TableSchema>) -> SqlFragment {
    let Some(obj) = data.as_object() else {
        return SqlFragment::empty();
    };

    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    let mut binds = Vec::new();

    for (idx, (key, value)) in obj.iter().enumerate() {
        columns.push(quote_identifier(key));
        placeholders.push(format!("${}", idx + 1));
        binds.push(BindValue::from_json(value, field_type(table, key)));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table_name),
        columns.join(", "),
        placeholders.join(", ")
    );

    SqlFragment { sql, binds }
}

/// Build an UPDATE SET clause from a JSON object.
pub fn build_update_set(data: &serde_json::Value, bind_offset: usize, table: Option<&TableSchema>) -> SqlFragment {
    let Some(obj) = data.as_object() else {
        return SqlFragment::empty();
    };

    let mut set_parts = Vec::new();
    let mut binds = Vec::new();

    for (idx, (key, value)) in obj.iter().filter(|(k, _)| k.as_str() != "id").enumerate() {
        set_parts.push(format!("{} = ${}", quote_identifier(key), bind_offset + idx + 1));
        binds.push(BindValue::from_json(value, field_type(table, key)));
    }

    SqlFragment {
        sql: set_parts.join(", "),
        binds,
    }
}

/// Quote a SQL identifier (table/column name).
/// Double quotes work for SQLite and Postgres; embedded quotes are stripped.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use routemarket_core::db::schema::MarketSchema;
    use serde_json::json;

    #[test]
    fn test_build_where_empty() {
        let frag = build_where(&[], 0, None);
        assert!(frag.sql.is_empty());
        assert!(frag.binds.is_empty());
    }

    #[test]
    fn test_build_where_eq() {
        let clauses = vec![WhereClause::eq("email", "rider@example.com")];
        let frag = build_where(&clauses, 0, None);
        assert_eq!(frag.sql, " WHERE \"email\" = $1");
        assert_eq!(frag.binds, vec![BindValue::Text("rider@example.com".into())]);
    }

    #[test]
    fn test_build_where_null() {
        let clauses = vec![WhereClause::eq("downloadedAt", serde_json::Value::Null)];
        let frag = build_where(&clauses, 0, None);
        assert_eq!(frag.sql, " WHERE \"downloadedAt\" IS NULL");
        assert!(frag.binds.is_empty());
    }

    #[test]
    fn test_build_where_and_with_offset() {
        let clauses = vec![
            WhereClause::eq("userId", "u1").and(),
            WhereClause::eq("routeId", "r1"),
        ];
        let frag = build_where(&clauses, 2, None);
        assert_eq!(frag.sql, " WHERE \"userId\" = $3 AND \"routeId\" = $4");
        assert_eq!(frag.binds.len(), 2);
    }

    #[test]
    fn test_build_where_lte() {
        let clauses = vec![WhereClause::with_operator("expiresAt", Operator::Lte, "2025-01-01T00:00:00.000000Z")];
        let frag = build_where(&clauses, 0, None);
        assert_eq!(frag.sql, " WHERE \"expiresAt\" <= $1");
    }

    #[test]
    fn test_build_where_in() {
        let clauses = vec![WhereClause::with_operator("accessType", Operator::In, json!(["PAID", "PREMIUM"]))];
        let frag = build_where(&clauses, 0, None);
        assert_eq!(frag.sql, " WHERE \"accessType\" IN ($1, $2)");
        assert_eq!(frag.binds.len(), 2);
    }

    #[test]
    fn test_build_where_empty_in_matches_nothing() {
        let clauses = vec![WhereClause::with_operator("id", Operator::In, json!([]))];
        let frag = build_where(&clauses, 0, None);
        assert_eq!(frag.sql, " WHERE 1 = 0");
    }

    #[test]
    fn test_bind_coercion_follows_schema() {
        let schema = MarketSchema::marketplace();
        let purchase = schema.get("purchase");
        let frag = build_insert("purchase", &json!({"amount": 12, "currency": "usd"}), purchase);
        assert!(frag.binds.contains(&BindValue::Float(12.0)));

        let route = schema.get("route");
        let frag = build_where(&[WhereClause::eq("isPublished", true)], 0, route);
        assert_eq!(frag.binds, vec![BindValue::Bool(true)]);
    }

    #[test]
    fn test_build_insert() {
        let frag = build_insert("user", &json!({"id": "abc", "email": "a@b.co"}), None);
        assert_eq!(frag.sql, "INSERT INTO \"user\" (\"email\", \"id\") VALUES ($1, $2)");
        assert_eq!(frag.binds.len(), 2);
    }

    #[test]
    fn test_build_update_set_skips_id() {
        let frag = build_update_set(&json!({"id": "x", "status": "CANCELLED"}), 0, None);
        assert_eq!(frag.sql, "\"status\" = $1");
        assert_eq!(frag.binds.len(), 1);
    }

    #[test]
    fn test_limit_offset_per_backend() {
        let query = FindManyQuery { offset: Some(10), ..Default::default() };
        assert_eq!(build_limit_offset(&query, DatabaseType::Sqlite), " LIMIT -1 OFFSET 10");
        assert_eq!(build_limit_offset(&query, DatabaseType::Postgres), " LIMIT ALL OFFSET 10");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("user"), "\"user\"");
        assert_eq!(quote_identifier("a\"b"), "\"ab\"");
    }
}
