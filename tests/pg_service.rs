//! Runs against the database in `DATABASE_URL`; every test returns early when it is unset.

use futures::FutureExt;
use scale_armor::model::{Cursor, Model, ModelError, ModelService, PagingOptions, Query};
use scale_armor::sql::quoted;
use scale_armor::PgModelService;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Item {
    #[serde(rename = "_id")]
    id: String,
    age: u32,
}

impl Model for Item {
    type Id = String;
}

fn item(id: &str, age: u32) -> Item {
    Item { id: id.into(), age }
}

async fn items() -> Option<PgModelService<Item>> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new().max_connections(4).connect(&url).await.ok()?;
    let schema = format!("armor_test_{}", uuid::Uuid::new_v4().simple());
    Some(PgModelService::new(pool, schema, "items"))
}

async fn cleanup(service: &PgModelService<Item>) {
    let drop = format!("DROP SCHEMA IF EXISTS {} CASCADE", quoted(service.schema()));
    sqlx::query(&drop).execute(service.pool()).await.unwrap();
}

#[tokio::test]
async fn mistyped_patch_leaves_the_row_untouched() {
    let Some(service) = items().await else { return };
    service.create(item("a", 3)).await.unwrap();

    let err = service
        .patch(&"a".to_string(), json!({"age": "x"}).as_object().cloned().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::InvalidModel { .. }));
    let page = service.find_all(&Query::All, &PagingOptions::default()).await.unwrap();
    assert_eq!(page.data, vec![item("a", 3)]);
    cleanup(&service).await;
}

#[tokio::test]
async fn transactions_commit_and_roll_back() {
    let Some(service) = items().await else { return };
    service.create(item("a", 1)).await.unwrap();

    service
        .with_transaction(|tx| {
            async move {
                tx.create(item("b", 2)).await?;
                tx.delete_by_id(&"a".to_string()).await
            }
            .boxed()
        })
        .await
        .unwrap();
    assert_eq!(service.get_by_id(&"b".to_string()).await.unwrap(), Some(item("b", 2)));
    assert_eq!(service.count(&Query::All).await.unwrap(), 1);

    let err = service
        .with_transaction(|tx| {
            async move {
                tx.create(item("c", 3)).await?;
                tx.create(item("b", 9)).await
            }
            .boxed()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Conflict(_)));
    assert_eq!(service.get_by_id(&"c".to_string()).await.unwrap(), None);

    let transaction = service.begin().await.unwrap();
    transaction.service().create(item("d", 4)).await.unwrap();
    assert!(matches!(transaction.service().begin().await, Err(ModelError::Transaction(_))));
    transaction.rollback().await.unwrap();
    assert_eq!(service.count(&Query::All).await.unwrap(), 1);
    cleanup(&service).await;
}

#[tokio::test]
async fn cursors_inside_transactions_see_uncommitted_rows() {
    let Some(service) = items().await else { return };
    let transaction = service.begin().await.unwrap();
    let view = transaction.service();
    view.create_all(vec![item("a", 1), item("b", 2), item("c", 3)]).await.unwrap();

    let mut cursor = view.select(&Query::All, &PagingOptions::default()).await.unwrap();
    assert!(cursor.fetch(0).await.unwrap().is_empty());
    assert_eq!(cursor.total_fetched(), 0);
    assert_eq!(cursor.fetch(2).await.unwrap(), vec![item("a", 1), item("b", 2)]);
    assert_eq!(cursor.count().await.unwrap(), 3);
    cursor.close().await.unwrap();

    transaction.commit().await.unwrap();
    assert_eq!(service.count(&Query::All).await.unwrap(), 3);
    cleanup(&service).await;
}
