//! Models and seed data used across the integration tests.

use serde_json::{Value, json};

use helios_tenancy::{Connection, Model, PluginOptions, Schema, TenancyPlugin, TenancyResult};

/// Builds a schema from a JSON definition and applies the default plugin.
pub fn tenant_schema(definition: Value) -> Schema {
    plugged_schema(definition, &[PluginOptions::default()])
}

/// Builds a schema from a JSON definition and applies one plugin per options.
pub fn plugged_schema(definition: Value, plugins: &[PluginOptions]) -> Schema {
    let mut schema = Schema::from_json(definition).expect("schema definition");
    for options in plugins {
        schema
            .plugin(&TenancyPlugin::new(options.clone()))
            .expect("plugin applies");
    }
    schema
}

/// An in-memory connection with an `Item {k, v}` model under the default
/// tenant dimension.
pub fn item_model() -> (Connection, Model) {
    let connection = Connection::in_memory();
    let model = connection
        .register("Item", tenant_schema(json!({"k": "Number", "v": "Number"})))
        .expect("model registers");
    (connection, model)
}

/// Creates `docs` through `model`, returning nothing but errors.
pub async fn seed(model: &Model, docs: Value) -> TenancyResult<()> {
    model.create(docs).await?;
    Ok(())
}

/// The seed data of the bulk write scenario: seven documents for tenant `a`
/// and one for tenant `b`.
pub fn bulk_scenario_seed() -> Value {
    json!([
        {"tenantId": "a", "k": 1, "v": 1},
        {"tenantId": "a", "k": 2, "v": 1},
        {"tenantId": "a", "k": 3, "v": 1},
        {"tenantId": "a", "k": 4, "v": 10},
        {"tenantId": "a", "k": 5, "v": 10},
        {"tenantId": "a", "k": 6, "v": 3},
        {"tenantId": "a", "k": 7, "v": 3},
        {"tenantId": "b", "k": 1, "v": 1}
    ])
}

/// Creates a tracing subscriber for test output. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
