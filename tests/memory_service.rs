use futures::FutureExt;
use scale_armor::model::{
    with_cursor, MemoryModelService, Model, ModelError, ModelService, Operator, PagingOptions, Pop, Query,
    SortType, UpdateQuery,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

async fn people() -> MemoryModelService<Value> {
    let service = MemoryModelService::new("people");
    service
        .create_all(vec![
            json!({"_id": 0, "name": "Test 0", "age": 8}),
            json!({"_id": 1, "name": "Beta", "age": 17, "score": 0}),
            json!({"_id": 2, "name": "Gamma", "age": 11, "books": ["Book 1", "Book 2"]}),
            json!({"_id": 3, "name": "All tests", "age": 33}),
            json!({"_id": 4, "name": "Zeta", "age": 12}),
            json!({"_id": 5, "name": "YJ", "age": 2}),
        ])
        .await
        .unwrap();
    service
}

fn query(value: Value) -> Query {
    Query::from_value(&value).unwrap()
}

async fn ids(service: &MemoryModelService<Value>, q: Query) -> Vec<i64> {
    let page = service
        .find_all(&q, &PagingOptions::new(1, 100))
        .await
        .unwrap();
    page.data.iter().map(|d| d["_id"].as_i64().unwrap()).collect()
}

#[tokio::test]
async fn find_all_pages_with_totals() {
    let service = people().await;
    let page = service.find_all(&Query::All, &PagingOptions::new(2, 2)).await.unwrap();
    let got: Vec<Value> = page.data.iter().map(|d| d["_id"].clone()).collect();
    assert_eq!(got, vec![json!(2), json!(3)]);
    assert_eq!(page.total, 6);
    assert_eq!(page.last_page, 3);
    assert_eq!(page.page, 2);
    assert_eq!(page.page_size, 2);
}

#[tokio::test]
async fn find_all_defaults_to_first_page_of_fifty() {
    let service = people().await;
    let page = service.find_all(&Query::All, &PagingOptions::default()).await.unwrap();
    assert_eq!((page.page, page.page_size, page.last_page), (1, 50, 1));
    assert_eq!(page.data.len(), 6);
}

#[tokio::test]
async fn comparison_and_logical_queries() {
    let service = people().await;
    assert_eq!(ids(&service, query(json!({"$on": {"age": {"$gt": 12}}}))).await, vec![1, 3]);
    assert_eq!(
        ids(&service, Query::And(vec![
            Query::field("age", Operator::Gte(json!(8))),
            Query::field("age", Operator::Lt(json!(12))),
        ]))
        .await,
        vec![0, 2]
    );
    assert_eq!(
        ids(&service, query(json!({"$or": [{"$on": {"name": "Beta"}}, {"$on": {"age": 2}}]}))).await,
        vec![1, 5]
    );
    assert_eq!(ids(&service, query(json!({"$or": []}))).await, Vec::<i64>::new());
    assert_eq!(ids(&service, query(json!({"$on": {"age": {"$in": [2, 33]}}}))).await, vec![3, 5]);
    assert_eq!(
        ids(&service, query(json!({"$on": {"age": {"$nin": [2, 33, 8, 17]}}}))).await,
        vec![2, 4]
    );
    assert_eq!(ids(&service, query(json!({"$on": {"name": {"$neq": "Beta"}}}))).await.len(), 5);
}

#[tokio::test]
async fn presence_pattern_and_length() {
    let service = people().await;
    assert_eq!(ids(&service, query(json!({"$on": {"score": {"$isSet": true}}}))).await, vec![1]);
    assert_eq!(ids(&service, query(json!({"$on": {"score": {"$isSet": false}}}))).await.len(), 5);
    assert_eq!(
        ids(&service, query(json!({"$on": {"name": {"$matchRegex": "[Tt]est"}}}))).await,
        vec![0, 3]
    );
    assert_eq!(ids(&service, query(json!({"$on": {"books": {"$length": 2}}}))).await, vec![2]);
    assert_eq!(ids(&service, query(json!({"$on": {"books": "Book 2"}}))).await, vec![2]);
}

#[tokio::test]
async fn unknown_operator_objects_are_ignored() {
    let service = people().await;
    assert_eq!(ids(&service, query(json!({"$on": {"age": {"$near": 3}}}))).await.len(), 6);
}

#[tokio::test]
async fn sorting_applies_before_paging() {
    let service = people().await;
    let options = PagingOptions::new(1, 3).sorted_by("age", SortType::Descending);
    let page = service.find_all(&Query::All, &options).await.unwrap();
    let ages: Vec<i64> = page.data.iter().map(|d| d["age"].as_i64().unwrap()).collect();
    assert_eq!(ages, vec![33, 17, 12]);
}

#[tokio::test]
async fn combined_update_directives() {
    let service = people().await;
    let update = UpdateQuery::new()
        .set("name", "Gamma 2")
        .unset("age")
        .push("books", "Book 3");
    let result = service.update(&Query::ById(json!(2)), &update).await.unwrap();
    assert!(result.updated);
    assert_eq!(result.matched, 1);
    let gamma = service.get_by_id(&json!(2)).await.unwrap().unwrap();
    assert_eq!(gamma, json!({"_id": 2, "name": "Gamma 2", "books": ["Book 1", "Book 2", "Book 3"]}));
}

#[tokio::test]
async fn add_to_set_and_pop() {
    let service = people().await;
    let by_id = Query::ById(json!(2));
    let unchanged = service
        .update(&by_id, &UpdateQuery::new().add_to_set("books", "Book 1"))
        .await
        .unwrap();
    assert!(!unchanged.updated);
    assert_eq!(unchanged.matched, 1);
    service
        .update(&by_id, &UpdateQuery::new().add_to_set("books", "Book 4"))
        .await
        .unwrap();
    service
        .update(&by_id, &UpdateQuery::new().pop("books", Pop::Index { index: 0 }))
        .await
        .unwrap();
    service
        .update(&by_id, &UpdateQuery::new().pop("books", Pop::Count(1)))
        .await
        .unwrap();
    let gamma = service.get_by_id(&json!(2)).await.unwrap().unwrap();
    assert_eq!(gamma["books"], json!(["Book 2"]));
}

#[tokio::test]
async fn empty_update_still_matches() {
    let service = people().await;
    let result = service.update_all(&query(json!({"$on": {"age": {"$lt": 12}}})), &UpdateQuery::new()).await.unwrap();
    assert_eq!(result.matched, 3);
    assert!(!result.updated);
}

#[tokio::test]
async fn update_or_insert_seeds_from_query() {
    let service = people().await;
    let result = service
        .update_or_insert(&query(json!({"$on": {"name": "Omega"}})), &UpdateQuery::new().set("age", 40))
        .await
        .unwrap();
    assert!(result.inserted);
    assert_eq!(result.matched, 0);
    let id = result.inserted_id.unwrap();
    let omega = service.get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(omega["name"], json!("Omega"));
    assert_eq!(omega["age"], json!(40));

    let again = service
        .update_or_insert(&query(json!({"$on": {"name": "Omega"}})), &UpdateQuery::new().set("age", 41))
        .await
        .unwrap();
    assert_eq!((again.matched, again.updated, again.inserted), (1, true, false));
}

#[tokio::test]
async fn replace_keeps_identity() {
    let service = people().await;
    let result = service
        .replace(&query(json!({"$on": {"name": "Zeta"}})), json!({"name": "Zeta 2"}))
        .await
        .unwrap();
    assert_eq!(result.ids, vec![json!(4)]);
    assert!(result.replaced);
    assert_eq!(service.get_by_id(&json!(4)).await.unwrap(), Some(json!({"_id": 4, "name": "Zeta 2"})));

    let missing = service.replace(&query(json!({"$id": 99})), json!({})).await.unwrap();
    assert_eq!((missing.matched, missing.replaced), (0, false));
}

#[tokio::test]
async fn deletes_and_clear() {
    let service = people().await;
    let removed = service.delete_all(&query(json!({"$on": {"age": {"$lt": 10}}}))).await.unwrap();
    assert_eq!((removed.deleted, removed.matched), (true, 2));
    assert!(!service.delete_by_id(&json!(0)).await.unwrap().deleted);
    assert_eq!(service.count(&Query::All).await.unwrap(), 4);
    service.clear().await.unwrap();
    assert_eq!(service.count(&Query::All).await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_ids_conflict() {
    let service = people().await;
    let err = service.create(json!({"_id": 3, "name": "again"})).await.unwrap_err();
    assert!(matches!(err, ModelError::Conflict(_)));
    let created = service.create(json!({"name": "fresh"})).await.unwrap();
    assert!(created["_id"].is_string());
}

#[tokio::test]
async fn cursor_batches_and_closes() {
    let service = people().await;
    let (first, second, has_next, fetched) = with_cursor::<Value, _, _, _>(
        &service,
        &Query::All,
        &PagingOptions::default(),
        |cursor| {
            async move {
                let first = cursor.fetch(4).await?;
                let second = cursor.fetch(4).await?;
                Ok((first.len(), second.len(), cursor.has_next(), cursor.total_fetched()))
            }
            .boxed()
        },
    )
    .await
    .unwrap();
    assert_eq!((first, second, has_next, fetched), (4, 2, false, 6));

    let mut cursor = service.select(&Query::All, &PagingOptions::default()).await.unwrap();
    cursor.close().await.unwrap();
    assert!(!cursor.is_open());
    assert!(matches!(cursor.fetch(1).await, Err(ModelError::CursorClosed)));
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Person {
    #[serde(rename = "_id")]
    id: i64,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    age: Option<i64>,
}

impl Model for Person {
    type Id = i64;
}

#[tokio::test]
async fn typed_models_round_trip_through_the_store() {
    let service = MemoryModelService::<Person>::new("typed");
    service
        .create(Person { id: 7, name: "Ada".into(), age: Some(36) })
        .await
        .unwrap();
    let patched = service
        .patch(&7, json!({"age": 37, "_id": 9}).as_object().cloned().unwrap())
        .await
        .unwrap();
    assert_eq!(patched, Some(Person { id: 7, name: "Ada".into(), age: Some(37) }));
    service.update(&Query::ById(7), &UpdateQuery::new().unset("age")).await.unwrap();
    assert_eq!(service.get_by_id(&7).await.unwrap().unwrap().age, None);
    assert_eq!(service.put(Person { id: 8, name: "Bo".into(), age: None }).await.unwrap().map(|p| p.id), Some(8));
    assert_eq!(service.count(&Query::All).await.unwrap(), 2);
}

#[tokio::test]
async fn mistyped_patch_is_rejected_and_not_stored() {
    let service = MemoryModelService::<Person>::new("typed");
    service
        .create(Person { id: 1, name: "Ada".into(), age: Some(3) })
        .await
        .unwrap();

    let err = service
        .patch(&1, json!({"age": "x"}).as_object().cloned().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::InvalidModel { .. }));

    let page = service.find_all(&Query::All, &PagingOptions::default()).await.unwrap();
    assert_eq!(page.data, vec![Person { id: 1, name: "Ada".into(), age: Some(3) }]);
}

#[tokio::test]
async fn transactions_commit_on_success() {
    let service = people().await;
    let created = service
        .with_transaction(|tx| {
            async move {
                tx.delete_by_id(&json!(0)).await?;
                tx.create(json!({"_id": 6, "name": "Eta", "age": 40})).await
            }
            .boxed()
        })
        .await
        .unwrap();
    assert_eq!(created["_id"], json!(6));
    assert_eq!(ids(&service, Query::All).await, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn transactions_roll_back_on_failure() {
    let service = people().await;
    let err = service
        .with_transaction(|tx| {
            async move {
                tx.update_all(&Query::All, &UpdateQuery::new().set("age", 1)).await?;
                tx.delete_by_id(&json!(3)).await?;
                tx.create(json!({"_id": 1, "name": "Duplicate"})).await
            }
            .boxed()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Conflict(_)));
    assert_eq!(ids(&service, Query::All).await, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(service.count(&query(json!({"$on": {"age": 1}}))).await.unwrap(), 0);
}
