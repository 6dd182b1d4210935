//! Tipos de erro para o crate mensageria

use thiserror::Error;

/// Erros de entrega de notificações
#[derive(Debug, Error)]
pub enum EntregaError {
    /// Erro de requisição HTTP (timeout, conexão recusada, etc)
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serviço de envio respondeu com status não-2xx
    #[error("Sender error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Serviço respondeu 2xx mas sinalizou falha no corpo JSON
    #[error("Sender rejected message: {0}")]
    Rejeitado(String),

    /// Endpoint do canal não configurado
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Fila encerrada (worker parado)
    #[error("Delivery queue closed")]
    FilaEncerrada,
}

/// Tipo Result padrão para o crate
pub type Result<T> = std::result::Result<T, EntregaError>;
