//! Cliente da API de dados de clientes
//!
//! - `POST /dadosCliente {"pontoAcesso": ...}`: clientes de um ponto de acesso
//! - `POST /pontosAcesso {"cidade": ...}`: clientes de todos os pontos de uma cidade

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::models::ClienteAfetado;
use crate::utils::logging::*;
use crate::utils::{AppError, AppResult};

/// Cliente como retornado pela API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClienteApi {
    #[serde(alias = "name")]
    pub nome: String,
    #[serde(alias = "code", alias = "cod_cliente")]
    pub codigo: String,
    #[serde(default, alias = "phone", alias = "celular")]
    pub telefone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "sistema")]
    pub origem: Option<String>,
    #[serde(default, alias = "pontoAcesso")]
    pub ponto_acesso: Option<String>,
    #[serde(default)]
    pub cancelado: bool,
}

impl From<ClienteApi> for ClienteAfetado {
    fn from(c: ClienteApi) -> Self {
        ClienteAfetado {
            nome: c.nome,
            codigo: c.codigo,
            telefone: c.telefone,
            email: c.email,
            origem: c.origem,
            ponto_acesso: c.ponto_acesso,
            whatsapp_confirmado: false,
            email_confirmado: false,
        }
    }
}

/// Fonte dos clientes afetados por ponto de acesso ou cidade
#[async_trait]
pub trait FonteClientes: Send + Sync {
    async fn clientes_por_ponto(&self, ponto_acesso: &str) -> AppResult<Vec<ClienteApi>>;

    async fn clientes_por_cidade(&self, cidade: &str) -> AppResult<Vec<ClienteApi>>;
}

#[derive(Clone)]
pub struct DadosClienteApi {
    client: Client,
    base_url: String,
}

impl DadosClienteApi {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(3))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn consultar(&self, endpoint: &str, body: Value) -> AppResult<Vec<ClienteApi>> {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!("POST {} with body: {}", url, body);

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            log_upstream_error(endpoint, None, &e.to_string());
            AppError::UpstreamError(format!("Falha ao consultar {}: {}", endpoint, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let texto = response.text().await.unwrap_or_default();
            log_upstream_error(endpoint, Some(status.as_u16()), &texto);
            return Err(AppError::UpstreamError(format!(
                "{} respondeu {}: {}",
                endpoint, status, texto
            )));
        }

        let body: Value = response.json().await?;
        extrair_clientes(body)
    }
}

/// Aceita `[...]`, `{"clientes": [...]}` ou `{"data": [...]}`
fn extrair_clientes(body: Value) -> AppResult<Vec<ClienteApi>> {
    let lista = match body {
        Value::Array(_) => body,
        Value::Object(mut mapa) => mapa
            .remove("clientes")
            .or_else(|| mapa.remove("data"))
            .unwrap_or(Value::Array(Vec::new())),
        _ => Value::Array(Vec::new()),
    };
    Ok(serde_json::from_value(lista)?)
}

#[async_trait]
impl FonteClientes for DadosClienteApi {
    async fn clientes_por_ponto(&self, ponto_acesso: &str) -> AppResult<Vec<ClienteApi>> {
        self.consultar("/dadosCliente", json!({ "pontoAcesso": ponto_acesso })).await
    }

    async fn clientes_por_cidade(&self, cidade: &str) -> AppResult<Vec<ClienteApi>> {
        self.consultar("/pontosAcesso", json!({ "cidade": cidade })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_dados_cliente_parses_wrapped_list() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/dadosCliente")
                .json_body(json!({"pontoAcesso": "OLT-RP-01"}));
            then.status(200).json_body(json!({
                "clientes": [
                    {"nome": "Ana", "codigo": "1", "phone": "16999990000"},
                    {"name": "Bruno", "code": "2", "cancelado": true}
                ]
            }));
        });

        let api = DadosClienteApi::new(server.base_url(), 5).unwrap();
        let clientes = api.clientes_por_ponto("OLT-RP-01").await.unwrap();
        mock.assert();
        assert_eq!(clientes.len(), 2);
        assert_eq!(clientes[0].telefone.as_deref(), Some("16999990000"));
        assert!(clientes[1].cancelado);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/pontosAcesso");
            then.status(500).body("boom");
        });

        let api = DadosClienteApi::new(server.base_url(), 5).unwrap();
        let err = api.clientes_por_cidade("São Carlos").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamError(_)));
    }

    #[test]
    fn test_extrair_plain_array() {
        let clientes = extrair_clientes(json!([{"nome": "C", "codigo": "9"}])).unwrap();
        assert_eq!(clientes[0].codigo, "9");
        assert!(extrair_clientes(json!({"outro": 1})).unwrap().is_empty());
    }
}
