use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;

use crate::services::notificacoes::NotificacaoError;
use crate::services::registro::RegistroError;
use crate::services::transicoes::TransicaoError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum AppError {
    StoreError(String),
    UpstreamError(String),
    ConfigError(String),
    JsonError(serde_json::Error),
    HttpError(reqwest::Error),
    ValidationError(String),
    NotFound(String),
    Conflict(String),
    Unauthorized(String),
    Forbidden(String),
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::StoreError(msg) => write!(f, "Store error: {}", msg),
            AppError::UpstreamError(msg) => write!(f, "Upstream error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::JsonError(err) => write!(f, "JSON error: {}", err),
            AppError::HttpError(err) => write!(f, "HTTP error: {}", err),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::JsonError(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::HttpError(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Config(msg) => AppError::ConfigError(msg),
            e @ StoreError::Conflito(_) => AppError::Conflict(e.to_string()),
            other => AppError::StoreError(other.to_string()),
        }
    }
}

impl From<TransicaoError> for AppError {
    fn from(err: TransicaoError) -> Self {
        match err {
            TransicaoError::NaoEncontrado(id) => AppError::NotFound(format!("Protocolo {} não encontrado", id)),
            e @ TransicaoError::TransicaoInvalida { .. } => AppError::Conflict(e.to_string()),
            e @ TransicaoError::JanelaInvalida(_) => AppError::ValidationError(e.to_string()),
            TransicaoError::Store(e) => e.into(),
        }
    }
}

impl From<RegistroError> for AppError {
    fn from(err: RegistroError) -> Self {
        match err {
            RegistroError::Validacao(msg) => AppError::ValidationError(msg),
            e @ RegistroError::ProtocoloDuplicado(_) => AppError::Conflict(e.to_string()),
            e @ RegistroError::Enriquecimento(_) => AppError::UpstreamError(e.to_string()),
            RegistroError::Store(e) => e.into(),
        }
    }
}

impl From<NotificacaoError> for AppError {
    fn from(err: NotificacaoError) -> Self {
        match err {
            e @ NotificacaoError::NaoEncontrado(_) => AppError::NotFound(e.to_string()),
            e @ NotificacaoError::SemDestinatarios(_) => AppError::ValidationError(e.to_string()),
            e @ NotificacaoError::CanalIncompativel { .. } => AppError::ValidationError(e.to_string()),
            NotificacaoError::Fila(e) => AppError::InternalError(e.to_string()),
            NotificacaoError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::StoreError(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::UpstreamError(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::JsonError(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::HttpError(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = json!({
            "error": error_message,
            "status": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Conflict("dup".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Forbidden("papel".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
        let resp: AppError = RegistroError::Validacao("faltou data".into()).into();
        assert_eq!(resp.into_response().status(), StatusCode::BAD_REQUEST);
        let conflito: AppError = StoreError::Conflito("Ativos/x".into()).into();
        assert_eq!(conflito.into_response().status(), StatusCode::CONFLICT);
    }
}
