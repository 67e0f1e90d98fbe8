//! Collection table DDL. Every collection is one table in the configured schema:
//! `seq` keeps insertion order, `doc` holds the JSON document, and a unique expression
//! index on `doc -> '_id'` enforces identity.

use crate::model::{ModelError, ID_FIELD};
use crate::sql::{qualified_table, quoted};
use sqlx::{Acquire, ConnectOptions, Postgres};
use std::str::FromStr;

/// Schema used when none is configured.
pub const DEFAULT_SCHEMA: &str = "armor";

/// Name of the unique id index of a collection table.
pub fn id_index_name(collection: &str) -> String {
    format!("{}_id_key", collection)
}

/// DDL statements creating a collection, in execution order. Each is idempotent.
pub fn collection_ddl(schema: &str, collection: &str) -> Vec<String> {
    let table = qualified_table(schema, collection);
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                seq BIGSERIAL PRIMARY KEY,
                doc JSONB NOT NULL CHECK (jsonb_typeof(doc) = 'object')
            )
            "#,
            table
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ((doc -> '{}'))",
            quoted(&id_index_name(collection)),
            table,
            ID_FIELD
        ),
    ]
}

/// Create the schema, the collection table and its id index if missing. Accepts a pool or a
/// connection, so the DDL can run inside an open transaction.
pub async fn ensure_collection<'c, A>(conn: A, schema: &str, collection: &str) -> Result<(), ModelError>
where
    A: Acquire<'c, Database = Postgres>,
{
    let mut conn = conn.acquire().await?;
    for ddl in collection_ddl(schema, collection) {
        tracing::debug!(sql = %ddl.trim(), "ddl");
        sqlx::query(&ddl).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Connects to the `postgres` database on the same server and creates the database named
/// in `database_url` when it does not exist yet.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), ModelError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| ModelError::Store(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), ModelError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| ModelError::Store("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_order_and_names() {
        let ddl = collection_ddl("armor", "people");
        assert_eq!(ddl[0], "CREATE SCHEMA IF NOT EXISTS \"armor\"");
        assert!(ddl[1].contains("CREATE TABLE IF NOT EXISTS \"armor\".\"people\""));
        assert!(ddl[1].contains("seq BIGSERIAL PRIMARY KEY"));
        assert_eq!(
            ddl[2],
            "CREATE UNIQUE INDEX IF NOT EXISTS \"people_id_key\" ON \"armor\".\"people\" ((doc -> '_id'))"
        );
    }

    #[test]
    fn database_name_from_url() {
        let (admin, name) = parse_db_name_from_url("postgres://u:p@localhost:5432/shop?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(name, "shop");
        assert!(parse_db_name_from_url("nopath").is_err());
    }
}
