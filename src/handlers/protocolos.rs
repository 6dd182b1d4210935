use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;

use protocolos_manutencao::models::{Protocolo, Usuario};
use protocolos_manutencao::services::registro::NovoProtocolo;
use protocolos_manutencao::services::transicoes::{Desfecho, Exclusao, NovaJanela};
use protocolos_manutencao::utils::logging::*;
use protocolos_manutencao::utils::{AppError, AppResult};
use protocolos_manutencao::AppState;

pub async fn registrar_protocolo(
    State(state): State<Arc<AppState>>,
    Extension(usuario): Extension<Usuario>,
    Json(novo): Json<NovoProtocolo>,
) -> AppResult<(StatusCode, Json<Protocolo>)> {
    let start_time = Instant::now();
    log_request_received("/protocolos", "POST");
    log_info(&format!("Cadastro do protocolo {} por {}", novo.numero, usuario.email));

    let protocolo = state.registro.registrar(novo, Utc::now()).await?;

    let processing_time = start_time.elapsed().as_millis() as u64;
    log_request_processed("/protocolos", StatusCode::CREATED.as_u16(), processing_time);
    Ok((StatusCode::CREATED, Json(protocolo)))
}

/// Consulta pelo espelho, inclusive concluídos
pub async fn buscar_protocolo(
    State(state): State<Arc<AppState>>,
    Path(numero): Path<String>,
) -> AppResult<Json<Protocolo>> {
    state
        .repositorio
        .buscar_espelho(&numero)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Protocolo {} não encontrado", numero)))
}

pub async fn avancar_protocolo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Protocolo>> {
    log_request_received(&format!("/protocolos/{}/avancar", id), "POST");
    Ok(Json(state.transicoes.avancar(&id, Utc::now()).await?))
}

pub async fn concluir_protocolo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(desfecho): Json<Desfecho>,
) -> AppResult<Json<Protocolo>> {
    log_request_received(&format!("/protocolos/{}/concluir", id), "POST");
    Ok(Json(state.transicoes.concluir(&id, desfecho, Utc::now()).await?))
}

pub async fn reagendar_protocolo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(janela): Json<NovaJanela>,
) -> AppResult<Json<Protocolo>> {
    log_request_received(&format!("/protocolos/{}/reagendar", id), "POST");
    Ok(Json(state.transicoes.reagendar(&id, janela, Utc::now()).await?))
}

pub async fn reabrir_protocolo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Protocolo>> {
    log_request_received(&format!("/protocolos/{}/reabrir", id), "POST");
    Ok(Json(state.transicoes.reabrir(&id, Utc::now()).await?))
}

pub async fn excluir_protocolo(
    State(state): State<Arc<AppState>>,
    Extension(usuario): Extension<Usuario>,
    Path(id): Path<String>,
) -> AppResult<Json<Exclusao>> {
    log_request_received(&format!("/protocolos/{}", id), "DELETE");
    let exclusao = state.transicoes.excluir(&id).await?;
    log_info(&format!("Exclusão do protocolo {} por {}", exclusao.numero, usuario.email));
    Ok(Json(exclusao))
}
