/// Controle de acesso por papel
///
/// O gateway do provedor de identidade autentica o usuário e repassa o uid no
/// header `X-User-Uid`. Aqui o usuário é carregado da coleção `users` e o
/// papel é comparado com o mínimo exigido pela rota.
///
/// # Respostas
///
/// - **401 Unauthorized**: header ausente ou uid desconhecido
/// - **403 Forbidden**: usuário inativo ou com papel insuficiente
///
/// O [`Usuario`] autorizado fica disponível para os handlers como
/// `Extension<Usuario>`.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::models::{Papel, Usuario};
use crate::utils::{AppError, AppResult};
use crate::AppState;

pub const HEADER_UID: &str = "X-User-Uid";

async fn autorizar(state: &AppState, headers: &HeaderMap, minimo: Papel) -> AppResult<Usuario> {
    let uid = headers
        .get(HEADER_UID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            tracing::warn!("❌ Acesso negado: header {} ausente", HEADER_UID);
            AppError::Unauthorized(format!("Missing {} header", HEADER_UID))
        })?;

    let usuario = state.usuarios.buscar(uid).await?.ok_or_else(|| {
        tracing::warn!("❌ Acesso negado: usuário {} desconhecido", uid);
        AppError::Unauthorized("Unknown user".to_string())
    })?;

    if !usuario.pode(minimo) {
        tracing::warn!(
            "🚫 Usuário {} ({:?}, ativo={}) sem permissão para rota {:?}",
            usuario.uid,
            usuario.papel,
            usuario.ativo,
            minimo
        );
        return Err(AppError::Forbidden(format!("Papel {:?} exigido", minimo)));
    }

    tracing::debug!("✅ Acesso liberado para {} ({:?})", usuario.uid, usuario.papel);
    Ok(usuario)
}

async fn exigir(state: Arc<AppState>, mut request: Request, next: Next, minimo: Papel) -> Result<Response, AppError> {
    let usuario = autorizar(&state, request.headers(), minimo).await?;
    request.extensions_mut().insert(usuario);
    Ok(next.run(request).await)
}

pub async fn exigir_leitor(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Result<Response, AppError> {
    exigir(state, request, next, Papel::Leitor).await
}

pub async fn exigir_operador(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Result<Response, AppError> {
    exigir(state, request, next, Papel::Operador).await
}

pub async fn exigir_admin(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Result<Response, AppError> {
    exigir(state, request, next, Papel::Admin).await
}
