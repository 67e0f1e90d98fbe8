//! PostgreSQL model backend. A collection is a JSONB document table (see [`crate::store`]);
//! selections are served by a server-side cursor inside a transaction.
//!
//! A service either checks out a pooled connection per operation or, when it is the view of a
//! [`PgTransaction`], runs every operation on that transaction. Multi-statement operations use a
//! nested transaction (a savepoint inside a bound view).

use crate::model::document::{apply_update, seed_from_filter};
use crate::model::CrudMethod;
use crate::model::translate::{translate_find_query, translate_update_query};
use crate::model::{
    to_document, Cursor, DeleteResult, FindOptions, InsertOrUpdateResult, Model, ModelError, ModelService,
    PagingOptions, Query, ReplaceResult, UpdateQuery, UpdateResult, ID_FIELD,
};
use crate::sql::{
    build_count, build_delete, build_drop, build_insert, build_patch, build_replace, build_select, build_truncate,
    build_update, build_upsert_by_id, quoted, QueryBuf,
};
use crate::store::ensure_collection;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Connection, PgConnection, PgExecutor, PgPool, Postgres, Transaction};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

fn plain(q: &QueryBuf) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    query
}

fn scalar<O>(q: &QueryBuf) -> sqlx::query::QueryScalar<'_, Postgres, O, PgArguments>
where
    O: Send + Unpin,
    (O,): for<'r> sqlx::FromRow<'r, PgRow>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query_scalar::<_, O>(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    query
}

/// Unique violations on the id index surface as conflicts.
fn map_db_error(e: sqlx::Error) -> ModelError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return ModelError::Conflict(format!("duplicate {}: {}", ID_FIELD, db.message()));
        }
    }
    ModelError::Db(e)
}

fn decode<T: Model>(document: Value) -> Result<T, ModelError> {
    Ok(serde_json::from_value(document)?)
}

fn new_id() -> Value {
    Value::String(uuid::Uuid::new_v4().to_string())
}

/// Serializes `model` and assigns a fresh identity when it has none.
fn prepare<T: Model>(model: &T) -> Result<Value, ModelError> {
    let mut document = to_document(model)?;
    if document.get(ID_FIELD).map_or(true, Value::is_null) {
        document.insert(ID_FIELD.into(), new_id());
    }
    Ok(Value::Object(document))
}

async fn insert_document<'e, E: PgExecutor<'e>>(
    executor: E,
    schema: &str,
    table: &str,
    document: &Value,
) -> Result<Value, ModelError> {
    let q = build_insert(schema, table, document);
    scalar::<Value>(&q).fetch_one(executor).await.map_err(map_db_error)
}

async fn update_documents<'e, E: PgExecutor<'e>, TId: serde::Serialize>(
    executor: E,
    schema: &str,
    table: &str,
    query: &Query<TId>,
    update: &UpdateQuery,
    many: bool,
) -> Result<UpdateResult, ModelError> {
    let q = build_update(schema, table, query, update, many)?;
    let changed: Vec<bool> = scalar::<bool>(&q).fetch_all(executor).await.map_err(map_db_error)?;
    Ok(UpdateResult {
        updated: changed.iter().any(|c| *c),
        matched: changed.len() as u64,
    })
}

/// Type-erases the collection DDL future so its `Send`-ness is proven generically rather than
/// inside the `async_trait` futures.
fn ensure_collection_boxed<'c, A>(conn: A, schema: &'c str, collection: &'c str) -> BoxFuture<'c, Result<(), ModelError>>
where
    A: sqlx::Acquire<'c, Database = Postgres> + Send + 'c,
    A::Connection: Send,
{
    Box::pin(ensure_collection(conn, schema, collection))
}

type SharedTransaction = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

const FINISHED: ModelError = ModelError::Transaction("already finished");

/// Connection one operation runs on.
enum Session<'a> {
    Pooled(PoolConnection<Postgres>),
    Borrowed(&'a mut PgConnection),
    Bound(MutexGuard<'a, Option<Transaction<'static, Postgres>>>),
}

impl Session<'_> {
    fn conn(&mut self) -> Result<&mut PgConnection, ModelError> {
        match self {
            Session::Pooled(conn) => Ok(&mut **conn),
            Session::Borrowed(conn) => Ok(&mut **conn),
            Session::Bound(tx) => tx.as_deref_mut().ok_or(FINISHED),
        }
    }
}

pub struct PgModelService<T> {
    pool: PgPool,
    schema: String,
    collection: String,
    initialized: Arc<Mutex<bool>>,
    bound: Option<SharedTransaction>,
    model: PhantomData<fn() -> T>,
}

impl<T: Model> PgModelService<T> {
    /// The collection table is created on first use.
    pub fn new(pool: PgPool, schema: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
            collection: collection.into(),
            initialized: Arc::new(Mutex::new(false)),
            bound: None,
            model: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn in_transaction(&self) -> bool {
        self.bound.is_some()
    }

    async fn session(&self) -> Result<Session<'_>, ModelError> {
        match &self.bound {
            Some(tx) => Ok(Session::Bound(tx.lock().await)),
            None => Ok(Session::Pooled(self.pool.acquire().await?)),
        }
    }

    fn ensure_initialized<'a>(&'a self, conn: &'a mut PgConnection) -> BoxFuture<'a, Result<(), ModelError>> {
        Box::pin(async move {
            let mut initialized = self.initialized.lock().await;
            if !*initialized {
                ensure_collection_boxed(conn, &self.schema, &self.collection).await?;
                *initialized = true;
            }
            Ok(())
        })
    }

    /// A session on an existing collection table.
    async fn open(&self) -> Result<Session<'_>, ModelError> {
        let mut session = self.session().await?;
        self.ensure_initialized(session.conn()?).await?;
        Ok(session)
    }

    /// Starts a transaction. Operations on [`PgTransaction::service`] run inside it until it is
    /// committed or rolled back; dropping it rolls back.
    pub async fn begin(&self) -> Result<PgTransaction<T>, ModelError> {
        if self.bound.is_some() {
            return Err(ModelError::Transaction("already in progress"));
        }
        drop(self.open().await?);
        let shared: SharedTransaction = Arc::new(Mutex::new(Some(self.pool.begin().await?)));
        tracing::debug!(collection = %self.collection, "transaction started");
        Ok(PgTransaction {
            service: PgModelService {
                pool: self.pool.clone(),
                schema: self.schema.clone(),
                collection: self.collection.clone(),
                initialized: Arc::clone(&self.initialized),
                bound: Some(Arc::clone(&shared)),
                model: PhantomData,
            },
            shared,
        })
    }

    /// Runs `f` inside a transaction, committing when it succeeds and rolling back otherwise.
    pub async fn with_transaction<R, F>(&self, f: F) -> Result<R, ModelError>
    where
        F: for<'s> FnOnce(&'s PgModelService<T>) -> BoxFuture<'s, Result<R, ModelError>>,
    {
        let transaction = self.begin().await?;
        match f(transaction.service()).await {
            Ok(value) => {
                transaction.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = transaction.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn upsert(
        &self,
        query: &Query<T::Id>,
        update: &UpdateQuery,
        many: bool,
    ) -> Result<InsertOrUpdateResult<T::Id>, ModelError> {
        let mut session = self.open().await?;
        let mut tx = session.conn()?.begin().await?;
        let updated = update_documents(&mut *tx, &self.schema, &self.collection, query, update, many).await?;
        if updated.matched > 0 {
            tx.commit().await?;
            return Ok(InsertOrUpdateResult {
                matched: updated.matched,
                updated: updated.updated,
                inserted: false,
                inserted_id: None,
            });
        }
        let mut document = seed_from_filter(&translate_find_query(query)?);
        apply_update(&translate_update_query(update), &mut document)?;
        if document.get(ID_FIELD).map_or(true, Value::is_null) {
            document[ID_FIELD] = new_id();
        }
        let inserted = insert_document(&mut *tx, &self.schema, &self.collection, &document).await?;
        tx.commit().await?;
        Ok(InsertOrUpdateResult {
            matched: 0,
            updated: false,
            inserted: true,
            inserted_id: Some(serde_json::from_value(inserted[ID_FIELD].clone())?),
        })
    }
}

/// A transaction over one collection, with a [`PgModelService`] view bound to it.
pub struct PgTransaction<T> {
    service: PgModelService<T>,
    shared: SharedTransaction,
}

impl<T: Model> PgTransaction<T> {
    pub fn service(&self) -> &PgModelService<T> {
        &self.service
    }

    async fn take(&self) -> Result<Transaction<'static, Postgres>, ModelError> {
        self.shared.lock().await.take().ok_or(FINISHED)
    }

    pub async fn commit(self) -> Result<(), ModelError> {
        self.take().await?.commit().await?;
        tracing::debug!(collection = %self.service.collection, "transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), ModelError> {
        self.take().await?.rollback().await?;
        tracing::debug!(collection = %self.service.collection, "transaction rolled back");
        Ok(())
    }
}

#[async_trait]
impl<T: Model> ModelService<T> for PgModelService<T> {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn select(&self, query: &Query<T::Id>, options: &PagingOptions) -> Result<Box<dyn Cursor<T>>, ModelError> {
        let select = build_select(&self.schema, &self.collection, query, &options.find_options())?;
        let count = build_count(&self.schema, &self.collection, query)?;
        let name = format!("armor_cursor_{}", uuid::Uuid::new_v4().simple());
        let declare = QueryBuf {
            sql: format!("DECLARE {} NO SCROLL CURSOR FOR {}", quoted(&name), select.sql),
            params: select.params,
        };
        let mut session = self.open().await?;
        let backing = match &self.bound {
            Some(shared) => {
                plain(&declare).execute(session.conn()?).await?;
                CursorSession::Shared(Arc::clone(shared))
            }
            None => {
                drop(session);
                let mut tx = self.pool.begin().await?;
                plain(&declare).execute(&mut *tx).await?;
                CursorSession::Owned(tx)
            }
        };
        Ok(Box::new(PgCursor::<T> {
            session: Some(backing),
            name,
            count,
            total: None,
            fetched: 0,
            has_next: true,
            model: PhantomData,
        }))
    }

    async fn count(&self, query: &Query<T::Id>) -> Result<u64, ModelError> {
        let q = build_count(&self.schema, &self.collection, query)?;
        let mut session = self.open().await?;
        let total: i64 = scalar(&q).fetch_one(session.conn()?).await?;
        Ok(total.max(0) as u64)
    }

    async fn find(&self, query: &Query<T::Id>) -> Result<Option<T>, ModelError> {
        let options = FindOptions {
            limit: Some(1),
            ..FindOptions::default()
        };
        let q = build_select(&self.schema, &self.collection, query, &options)?;
        let mut session = self.open().await?;
        let found: Option<Value> = scalar(&q).fetch_optional(session.conn()?).await?;
        found.map(decode).transpose()
    }

    async fn create(&self, model: T) -> Result<T, ModelError> {
        let document = prepare(&model)?;
        let mut session = self.open().await?;
        decode(insert_document(session.conn()?, &self.schema, &self.collection, &document).await?)
    }

    async fn create_all(&self, models: Vec<T>) -> Result<Vec<T>, ModelError> {
        let documents = models.iter().map(prepare).collect::<Result<Vec<_>, _>>()?;
        let mut session = self.open().await?;
        let mut tx = session.conn()?.begin().await?;
        let mut created = Vec::with_capacity(documents.len());
        for document in &documents {
            let row = insert_document(&mut *tx, &self.schema, &self.collection, document).await?;
            created.push(decode(row)?);
        }
        tx.commit().await?;
        Ok(created)
    }

    /// The patched row is only committed once it still reads back as a `T`.
    async fn patch(&self, id: &T::Id, mut fields: Map<String, Value>) -> Result<Option<T>, ModelError> {
        fields.remove(ID_FIELD);
        let q = build_patch(
            &self.schema,
            &self.collection,
            &serde_json::to_value(id)?,
            &Value::Object(fields),
        );
        let mut session = self.open().await?;
        let mut tx = session.conn()?.begin().await?;
        let Some(patched) = scalar::<Value>(&q).fetch_optional(&mut *tx).await.map_err(map_db_error)? else {
            return Ok(None);
        };
        let patched: T =
            serde_json::from_value(patched).map_err(|e| ModelError::invalid(CrudMethod::Patch, e.to_string()))?;
        tx.commit().await?;
        Ok(Some(patched))
    }

    async fn put(&self, model: T) -> Result<Option<T>, ModelError> {
        let q = build_upsert_by_id(&self.schema, &self.collection, &prepare(&model)?);
        let mut session = self.open().await?;
        let stored: Option<Value> = scalar(&q).fetch_optional(session.conn()?).await.map_err(map_db_error)?;
        stored.map(decode).transpose()
    }

    async fn delete_by_id(&self, id: &T::Id) -> Result<DeleteResult, ModelError> {
        self.delete_all(&Query::ById(id.clone())).await
    }

    async fn update(&self, query: &Query<T::Id>, update: &UpdateQuery) -> Result<UpdateResult, ModelError> {
        let mut session = self.open().await?;
        update_documents(session.conn()?, &self.schema, &self.collection, query, update, false).await
    }

    async fn update_all(&self, query: &Query<T::Id>, update: &UpdateQuery) -> Result<UpdateResult, ModelError> {
        let mut session = self.open().await?;
        update_documents(session.conn()?, &self.schema, &self.collection, query, update, true).await
    }

    async fn update_or_insert(
        &self,
        query: &Query<T::Id>,
        update: &UpdateQuery,
    ) -> Result<InsertOrUpdateResult<T::Id>, ModelError> {
        self.upsert(query, update, false).await
    }

    async fn update_or_insert_all(
        &self,
        query: &Query<T::Id>,
        update: &UpdateQuery,
    ) -> Result<InsertOrUpdateResult<T::Id>, ModelError> {
        self.upsert(query, update, true).await
    }

    async fn delete_all(&self, query: &Query<T::Id>) -> Result<DeleteResult, ModelError> {
        let q = build_delete(&self.schema, &self.collection, query)?;
        let mut session = self.open().await?;
        let removed = plain(&q).execute(session.conn()?).await?.rows_affected();
        Ok(DeleteResult {
            deleted: removed > 0,
            matched: removed,
        })
    }

    async fn replace(&self, query: &Query<T::Id>, model: T) -> Result<ReplaceResult<T::Id>, ModelError> {
        let q = build_replace(&self.schema, &self.collection, query, &Value::Object(to_document(&model)?))?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut statement = sqlx::query_as::<_, (Value, bool)>(&q.sql);
        for p in &q.params {
            statement = statement.bind(p.clone());
        }
        let mut session = self.open().await?;
        match statement.fetch_optional(session.conn()?).await.map_err(map_db_error)? {
            Some((id, replaced)) => Ok(ReplaceResult {
                ids: vec![serde_json::from_value(id)?],
                replaced,
                matched: 1,
            }),
            None => Ok(ReplaceResult {
                ids: Vec::new(),
                replaced: false,
                matched: 0,
            }),
        }
    }

    async fn clear(&self) -> Result<(), ModelError> {
        let mut session = self.open().await?;
        plain(&build_truncate(&self.schema, &self.collection))
            .execute(session.conn()?)
            .await?;
        Ok(())
    }

    async fn drop_collection(&self) -> Result<(), ModelError> {
        let mut session = self.session().await?;
        let mut initialized = self.initialized.lock().await;
        plain(&build_drop(&self.schema, &self.collection))
            .execute(session.conn()?)
            .await?;
        *initialized = false;
        Ok(())
    }
}

/// What keeps a server-side cursor alive: its own transaction, or the transaction of the view
/// that opened it.
enum CursorSession {
    Owned(Transaction<'static, Postgres>),
    Shared(SharedTransaction),
}

impl CursorSession {
    async fn session(&mut self) -> Session<'_> {
        match self {
            CursorSession::Owned(tx) => Session::Borrowed(&mut **tx),
            CursorSession::Shared(shared) => Session::Bound(shared.lock().await),
        }
    }
}

/// Server-side cursor. Dropping an owned cursor without `close` rolls its transaction back,
/// which releases the cursor as well; a cursor opened in a transaction ends with it.
pub struct PgCursor<T> {
    session: Option<CursorSession>,
    name: String,
    count: QueryBuf,
    total: Option<u64>,
    fetched: u64,
    has_next: bool,
    model: PhantomData<fn() -> T>,
}

impl<T: Model> PgCursor<T> {
    async fn fetch_statement(&mut self, sql: String, size: Option<usize>) -> Result<Vec<T>, ModelError> {
        let backing = self.session.as_mut().ok_or(ModelError::CursorClosed)?;
        let mut session = backing.session().await;
        tracing::debug!(sql = %sql, "query");
        let rows: Vec<Value> = sqlx::query_scalar(&sql).fetch_all(session.conn()?).await?;
        drop(session);
        if size.map_or(true, |size| rows.len() < size) {
            self.has_next = false;
        }
        self.fetched += rows.len() as u64;
        rows.into_iter().map(decode).collect()
    }
}

#[async_trait]
impl<T: Model> Cursor<T> for PgCursor<T> {
    fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn has_next(&self) -> bool {
        self.is_open() && self.has_next
    }

    fn total_fetched(&self) -> u64 {
        self.fetched
    }

    async fn fetch(&mut self, size: usize) -> Result<Vec<T>, ModelError> {
        if !self.is_open() {
            return Err(ModelError::CursorClosed);
        }
        // FETCH FORWARD 0 would return the current row again.
        if size == 0 {
            return Ok(Vec::new());
        }
        let sql = format!("FETCH FORWARD {} FROM {}", size, quoted(&self.name));
        self.fetch_statement(sql, Some(size)).await
    }

    async fn to_array(&mut self) -> Result<Vec<T>, ModelError> {
        let sql = format!("FETCH ALL FROM {}", quoted(&self.name));
        self.fetch_statement(sql, None).await
    }

    async fn count(&mut self) -> Result<u64, ModelError> {
        if let Some(total) = self.total {
            return Ok(total);
        }
        let backing = self.session.as_mut().ok_or(ModelError::CursorClosed)?;
        let mut session = backing.session().await;
        let total: i64 = scalar(&self.count).fetch_one(session.conn()?).await?;
        drop(session);
        let total = total.max(0) as u64;
        self.total = Some(total);
        Ok(total)
    }

    async fn close(&mut self) -> Result<(), ModelError> {
        self.has_next = false;
        let Some(backing) = self.session.take() else {
            return Ok(());
        };
        let close = format!("CLOSE {}", quoted(&self.name));
        tracing::debug!(sql = %close, "query");
        match backing {
            CursorSession::Owned(mut tx) => {
                sqlx::query(&close).execute(&mut *tx).await?;
                tx.commit().await?;
            }
            CursorSession::Shared(shared) => {
                if let Some(tx) = shared.lock().await.as_deref_mut() {
                    sqlx::query(&close).execute(tx).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prepare_assigns_missing_ids_only() {
        let kept = prepare(&json!({"_id": 4, "name": "a"})).unwrap();
        assert_eq!(kept["_id"], json!(4));
        let generated = prepare(&json!({"_id": null})).unwrap();
        assert!(uuid::Uuid::parse_str(generated["_id"].as_str().unwrap()).is_ok());
        assert!(prepare(&json!([1])).is_err());
    }

    #[test]
    fn database_errors_other_than_conflicts_pass_through() {
        assert!(matches!(map_db_error(sqlx::Error::RowNotFound), ModelError::Db(_)));
    }
}
