//! Mensageria: entrega de notificações de protocolos
//!
//! Cada despacho agrupa as mensagens de um canal para um protocolo. O worker da
//! fila envia um POST por destinatário, sequencialmente, com até N tentativas e
//! backoff exponencial, e mantém o status de cada destinatário consultável.
//!
//! ```text
//! disparo -> FilaEntrega::enfileirar -> worker -> Remetente::enviar (retry)
//!                                               -> callback ao concluir
//! ```

pub mod error;
pub mod fila;
pub mod remetente;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use error::{EntregaError, Result};
pub use fila::{ConfigFila, Despacho, EstadoDespacho, EstadoDestinatario, FilaEntrega, StatusEntrega};
pub use remetente::{Endpoints, Remetente, RemetenteHttp};

/// Canal de notificação
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Canal {
    Email,
    Whatsapp,
    EmailB2b,
}

impl fmt::Display for Canal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Canal::Email => write!(f, "email"),
            Canal::Whatsapp => write!(f, "whatsapp"),
            Canal::EmailB2b => write!(f, "email_b2b"),
        }
    }
}

/// Mensagem já renderizada para um destinatário
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mensagem {
    /// Telefone (WhatsApp) ou endereço de email
    pub destino: String,
    pub nome: String,
    /// Código do cliente afetado
    pub codigo: String,
    /// Número do protocolo
    pub referencia: String,
    pub assunto: Option<String>,
    pub corpo: String,
}
