use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

use protocolos_manutencao::store::Colecao;
use protocolos_manutencao::utils::logging::*;
use protocolos_manutencao::AppState;

pub async fn health_check() -> Json<Value> {
    log_health_check();

    Json(json!({
        "status": "healthy",
        "service": "protocolos-manutencao",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn ready_check(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StatusCode> {
    log_health_check();

    // uma leitura simples basta para saber se o backend responde
    let store_status = match state.store.exists(Colecao::Users, "_ready").await {
        Ok(_) => "connected",
        Err(e) => {
            log_store_error("ready_check", &e.to_string());
            "disconnected"
        }
    };
    let painel = state.painel.read().await.contagens();

    if store_status != "connected" {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(json!({
        "ready": true,
        "service": "protocolos-manutencao",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "dependencies": {
            "store": {
                "status": store_status,
                "backend": state.settings.store.backend
            },
            "enriquecimento": {
                "base_url": state.settings.enriquecimento.base_url
            }
        },
        "painel": painel
    })))
}
