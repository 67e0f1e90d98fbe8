//! Example consumer: serves a `people` model app and a small decorated controller.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Without `DATABASE_URL` the collections live in memory.

use scale_armor::app::BindingRegistry;
use scale_armor::controller::{Controller, Reply};
use scale_armor::model::{MemoryModelService, Model, ModelService};
use scale_armor::router::Method;
use scale_armor::{
    common_routes, ensure_database_exists, router, ModelAppProvider, ModelController, PgModelService, RuleValidator,
    Server, Settings, SimpleAppProvider,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Person {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

impl Model for Person {
    type Id = String;
}

struct About {
    backend: &'static str,
}

async fn people_service(settings: &Settings) -> Result<Arc<dyn ModelService<Person>>, Box<dyn std::error::Error>> {
    let Some(database_url) = &settings.database_url else {
        return Ok(Arc::new(MemoryModelService::<Person>::new("people")));
    };
    ensure_database_exists(database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(Arc::new(PgModelService::<Person>::new(pool, settings.schema.clone(), "people")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scale_armor=info")),
        )
        .init();

    let service = people_service(&settings).await?;
    let rules = RuleValidator::from_value(serde_json::json!({
        "name": {"required": true, "minLength": 1, "maxLength": 80},
        "email": {"format": "email"}
    }))?;
    let controller = Arc::new(ModelController::with_rules(service, Arc::new(rules)));
    let people = ModelAppProvider::new(controller).with_page_size(settings.default_page_size);

    let registry = BindingRegistry::new();
    Controller::bind_params::<About, _, _>(&registry, Method::Get, "/", |about, _| async move {
        Reply::data(serde_json::json!({"backend": about.backend}))
    });
    registry.provided_for::<About>("about");
    let about = About {
        backend: if settings.database_url.is_some() { "postgres" } else { "memory" },
    };

    let mut server = Server::new();
    server.app_from_provider(&people, "people");
    server.app_bound_to(&registry, SimpleAppProvider::new(), None, Arc::new(about))?;

    let app = router(Arc::new(server), &settings).merge(common_routes());
    let listener = TcpListener::bind(settings.bind_addr).await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://{}:{}", settings.bind_addr.ip(), port);
    axum::serve(listener, app).await?;
    Ok(())
}
