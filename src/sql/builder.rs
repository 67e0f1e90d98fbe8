//! Builds the parameterized statements a collection table is read and written with.
//! Identifiers come from configuration and are quoted; every value is a parameter.

use super::params::PgBindValue;
use super::translate::{update_steps, where_clause};
use crate::model::{FindOptions, ModelError, Query, SortType, UpdateQuery, ID_FIELD};
use serde::Serialize;
use serde_json::Value;

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    pub fn new() -> Self {
        QueryBuf::default()
    }

    /// Appends a parameter and returns its placeholder.
    pub fn push_param(&mut self, v: PgBindValue) -> String {
        self.params.push(v);
        format!("${}", self.params.len())
    }

    /// Placeholder cast to jsonb.
    pub fn json(&mut self, v: &Value) -> String {
        format!("{}::jsonb", self.push_param(PgBindValue::Json(v.clone())))
    }
}

/// Document column as seen by ORDER BY.
fn sort_expression(buf: &mut QueryBuf, field: &str, sort_type: SortType) -> String {
    let segments: Vec<String> = field
        .split('.')
        .map(|s| buf.push_param(PgBindValue::text(s)))
        .collect();
    let direction = match sort_type {
        SortType::Ascending => "ASC NULLS FIRST",
        SortType::Descending => "DESC NULLS LAST",
    };
    format!("jsonb_extract_path(doc, {}) {}, ", segments.join(", "), direction)
}

pub fn build_select<TId: Serialize>(
    schema: &str,
    table: &str,
    query: &Query<TId>,
    options: &FindOptions,
) -> Result<QueryBuf, ModelError> {
    let mut q = QueryBuf::new();
    let filter = where_clause(&mut q, query)?;
    let order = match &options.sort {
        Some((field, sort_type)) => sort_expression(&mut q, field, *sort_type),
        None => String::new(),
    };
    q.sql = format!(
        "SELECT doc FROM {} WHERE {} ORDER BY {}seq",
        qualified_table(schema, table),
        filter,
        order
    );
    if let Some(limit) = options.limit {
        let p = q.push_param(PgBindValue::I64(limit as i64));
        q.sql.push_str(&format!(" LIMIT {}::bigint", p));
    }
    if let Some(skip) = options.skip.filter(|skip| *skip > 0) {
        let p = q.push_param(PgBindValue::I64(skip as i64));
        q.sql.push_str(&format!(" OFFSET {}::bigint", p));
    }
    Ok(q)
}

pub fn build_count<TId: Serialize>(schema: &str, table: &str, query: &Query<TId>) -> Result<QueryBuf, ModelError> {
    let mut q = QueryBuf::new();
    let filter = where_clause(&mut q, query)?;
    q.sql = format!("SELECT COUNT(*) FROM {} WHERE {}", qualified_table(schema, table), filter);
    Ok(q)
}

pub fn build_insert(schema: &str, table: &str, doc: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let value = q.json(doc);
    q.sql = format!("INSERT INTO {} (doc) VALUES ({}) RETURNING doc", qualified_table(schema, table), value);
    q
}

/// Insert, or replace the document holding the same id.
pub fn build_upsert_by_id(schema: &str, table: &str, doc: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let value = q.json(doc);
    q.sql = format!(
        "INSERT INTO {} (doc) VALUES ({}) ON CONFLICT ((doc -> '{}')) DO UPDATE SET doc = EXCLUDED.doc RETURNING doc",
        qualified_table(schema, table),
        value,
        ID_FIELD
    );
    q
}

/// Shallow merge of `fields` into the document with the given id.
pub fn build_patch(schema: &str, table: &str, id: &Value, fields: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let fields = q.json(fields);
    let id = q.json(id);
    q.sql = format!(
        "UPDATE {} SET doc = doc || {} WHERE doc -> '{}' = {} RETURNING doc",
        qualified_table(schema, table),
        fields,
        ID_FIELD,
        id
    );
    q
}

pub fn build_delete<TId: Serialize>(schema: &str, table: &str, query: &Query<TId>) -> Result<QueryBuf, ModelError> {
    let mut q = QueryBuf::new();
    let filter = where_clause(&mut q, query)?;
    q.sql = format!("DELETE FROM {} WHERE {}", qualified_table(schema, table), filter);
    Ok(q)
}

/// Applies an update to the first match (`many == false`) or to every match.
/// Each directive is a CTE step over the previous one; the statement returns one
/// boolean per matched row telling whether its document changed.
pub fn build_update<TId: Serialize>(
    schema: &str,
    table: &str,
    query: &Query<TId>,
    update: &UpdateQuery,
    many: bool,
) -> Result<QueryBuf, ModelError> {
    let mut q = QueryBuf::new();
    let table_name = qualified_table(schema, table);
    let filter = where_clause(&mut q, query)?;
    let limit = if many { "" } else { " LIMIT 1" };
    let mut sql = format!(
        "WITH s0 AS (SELECT seq, doc AS previous, doc FROM {} WHERE {} ORDER BY seq{} FOR UPDATE)",
        table_name, filter, limit
    );
    let steps = update_steps(&mut q, update)?;
    for (i, step) in steps.iter().enumerate() {
        sql.push_str(&format!(
            ", s{} AS (SELECT seq, previous, {} AS doc FROM s{})",
            i + 1,
            step,
            i
        ));
    }
    let last = format!("s{}", steps.len());
    sql.push_str(&format!(
        " UPDATE {t} AS t SET doc = {l}.doc FROM {l} WHERE t.seq = {l}.seq RETURNING t.doc IS DISTINCT FROM {l}.previous",
        t = table_name,
        l = last
    ));
    q.sql = sql;
    Ok(q)
}

/// Replaces the first match with `doc`, keeping the matched id. Returns the id and
/// whether the stored document changed.
pub fn build_replace<TId: Serialize>(
    schema: &str,
    table: &str,
    query: &Query<TId>,
    doc: &Value,
) -> Result<QueryBuf, ModelError> {
    let mut q = QueryBuf::new();
    let table_name = qualified_table(schema, table);
    let filter = where_clause(&mut q, query)?;
    let value = q.json(doc);
    q.sql = format!(
        "WITH target AS (SELECT seq, doc AS previous FROM {t} WHERE {f} ORDER BY seq LIMIT 1 FOR UPDATE) \
         UPDATE {t} AS t SET doc = jsonb_set({v}, '{{{id}}}', target.previous -> '{id}', true) FROM target \
         WHERE t.seq = target.seq RETURNING t.doc -> '{id}', t.doc IS DISTINCT FROM target.previous",
        t = table_name,
        f = filter,
        v = value,
        id = ID_FIELD
    );
    Ok(q)
}

pub fn build_truncate(schema: &str, table: &str) -> QueryBuf {
    QueryBuf {
        sql: format!("TRUNCATE {}", qualified_table(schema, table)),
        params: Vec::new(),
    }
}

pub fn build_drop(schema: &str, table: &str) -> QueryBuf {
    QueryBuf {
        sql: format!("DROP TABLE IF EXISTS {}", qualified_table(schema, table)),
        params: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PagingOptions;
    use serde_json::json;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(qualified_table("armor", "we\"ird"), "\"armor\".\"we\"\"ird\"");
    }

    #[test]
    fn select_with_paging_and_sort() {
        let options = PagingOptions::new(2, 10)
            .sorted_by("age", SortType::Descending)
            .find_options();
        let q = build_select::<Value>("armor", "people", &Query::All, &options).unwrap();
        assert_eq!(
            q.sql,
            "SELECT doc FROM \"armor\".\"people\" WHERE TRUE ORDER BY jsonb_extract_path(doc, $1) DESC NULLS LAST, seq LIMIT $2::bigint OFFSET $3::bigint"
        );
        assert_eq!(
            q.params,
            vec![PgBindValue::text("age"), PgBindValue::I64(10), PgBindValue::I64(10)]
        );
    }

    #[test]
    fn upsert_targets_id_index() {
        let q = build_upsert_by_id("armor", "people", &json!({"_id": 1}));
        assert!(q.sql.contains("ON CONFLICT ((doc -> '_id')) DO UPDATE SET doc = EXCLUDED.doc"));
        assert_eq!(q.params.len(), 1);
    }

    #[test]
    fn update_chains_steps() {
        let update = UpdateQuery::new().set("name", "x").unset("age");
        let q = build_update::<Value>("armor", "people", &Query::ById(json!(1)), &update, false).unwrap();
        assert!(q.sql.starts_with(
            "WITH s0 AS (SELECT seq, doc AS previous, doc FROM \"armor\".\"people\" WHERE doc -> '_id' = $1::jsonb ORDER BY seq LIMIT 1 FOR UPDATE), s1 AS"
        ));
        assert!(q.sql.contains("s2 AS (SELECT seq, previous, (doc #- ARRAY[$4]::text[]) AS doc FROM s1)"));
        assert!(q.sql.ends_with("RETURNING t.doc IS DISTINCT FROM s2.previous"));
    }

    #[test]
    fn update_many_has_no_limit() {
        let q = build_update::<Value>("armor", "people", &Query::All, &UpdateQuery::new(), true).unwrap();
        assert!(!q.sql.contains("LIMIT"));
        assert!(q.sql.contains("FROM s0 WHERE t.seq = s0.seq"));
    }

    #[test]
    fn replace_keeps_matched_id() {
        let q = build_replace::<Value>("armor", "people", &Query::All, &json!({"name": "n"})).unwrap();
        assert!(q.sql.contains("jsonb_set($1::jsonb, '{_id}', target.previous -> '_id', true)"));
    }
}
