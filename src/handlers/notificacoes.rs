use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mensageria::{Canal, EstadoDespacho};
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::Instant;

use protocolos_manutencao::services::notificacoes::Disparo;
use protocolos_manutencao::utils::logging::*;
use protocolos_manutencao::utils::{AppError, AppResult};
use protocolos_manutencao::AppState;

#[derive(Debug, Deserialize)]
pub struct PedidoNotificacao {
    pub canal: Canal,
    pub template: String,
}

/// Enfileira o aviso e responde 202 com o id do despacho
pub async fn notificar_protocolo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(pedido): Json<PedidoNotificacao>,
) -> AppResult<(StatusCode, Json<Disparo>)> {
    let start_time = Instant::now();
    let endpoint = format!("/protocolos/{}/notificar", id);
    log_request_received(&endpoint, "POST");
    let disparo = state
        .notificacoes
        .disparar(&id, pedido.canal, &pedido.template)
        .await?;

    let processing_time = start_time.elapsed().as_millis() as u64;
    log_request_processed(&endpoint, StatusCode::ACCEPTED.as_u16(), processing_time);
    Ok((StatusCode::ACCEPTED, Json(disparo)))
}

pub async fn status_despacho(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<EstadoDespacho>> {
    state
        .notificacoes
        .status(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Despacho {} não encontrado", id)))
}
