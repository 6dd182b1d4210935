//! Clientes HTTP para os microsserviços de envio (email, WhatsApp, email B2B)

use crate::error::{EntregaError, Result};
use crate::{Canal, Mensagem};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;

/// Algo capaz de entregar uma mensagem em um canal
#[async_trait]
pub trait Remetente: Send + Sync {
    async fn enviar(&self, canal: Canal, mensagem: &Mensagem) -> Result<()>;
}

/// URLs dos microsserviços de envio
#[derive(Debug, Clone, Default)]
pub struct Endpoints {
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub email_b2b: Option<String>,
}

impl Endpoints {
    fn para(&self, canal: Canal) -> Option<&str> {
        match canal {
            Canal::Email => self.email.as_deref(),
            Canal::Whatsapp => self.whatsapp.as_deref(),
            Canal::EmailB2b => self.email_b2b.as_deref(),
        }
    }
}

/// Remetente que faz um POST JSON por destinatário
#[derive(Clone)]
pub struct RemetenteHttp {
    http_client: HttpClient,
    endpoints: Endpoints,
}

impl RemetenteHttp {
    /// Cria o remetente com timeout total e de conexão em segundos
    pub fn new(endpoints: Endpoints, timeout_secs: u64) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| EntregaError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client, endpoints })
    }

    /// Corpo enviado ao microsserviço de cada canal
    pub fn corpo(canal: Canal, mensagem: &Mensagem) -> Value {
        match canal {
            Canal::Whatsapp => json!({
                "phone": mensagem.destino,
                "nome": mensagem.nome,
                "message": mensagem.corpo,
                "referencia": mensagem.referencia,
            }),
            Canal::Email | Canal::EmailB2b => json!({
                "to": mensagem.destino,
                "nome": mensagem.nome,
                "subject": mensagem.assunto.clone().unwrap_or_default(),
                "html": mensagem.corpo,
                "referencia": mensagem.referencia,
            }),
        }
    }
}

#[async_trait]
impl Remetente for RemetenteHttp {
    async fn enviar(&self, canal: Canal, mensagem: &Mensagem) -> Result<()> {
        let url = self
            .endpoints
            .para(canal)
            .ok_or_else(|| EntregaError::ConfigError(format!("Endpoint não configurado para {}", canal)))?;

        tracing::debug!("POST {} ({}) -> {}", url, canal, mensagem.destino);

        let response = self
            .http_client
            .post(url)
            .json(&Self::corpo(canal, mensagem))
            .send()
            .await?;

        let status = response.status();
        let texto = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(EntregaError::ApiError {
                status: status.as_u16(),
                message: texto,
            });
        }

        // Os serviços respondem {"status": "..."} ou {"success": bool}
        if let Ok(body) = serde_json::from_str::<Value>(&texto) {
            let falhou = body.get("success").and_then(|v| v.as_bool()) == Some(false)
                || matches!(
                    body.get("status").and_then(|v| v.as_str()),
                    Some("error") | Some("erro") | Some("failed")
                );
            if falhou {
                let motivo = body
                    .get("message")
                    .or_else(|| body.get("error"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("sem detalhes")
                    .to_string();
                return Err(EntregaError::Rejeitado(motivo));
            }
        }

        Ok(())
    }
}
