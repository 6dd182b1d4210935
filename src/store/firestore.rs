//! Backend Firestore via API REST
//!
//! - Leituras: `GET {documents}/{colecao}/{id}` e listagem paginada
//! - Escritas: `POST {documents}:commit`, atômico para o lote inteiro
//! - Assinaturas: polling periódico da coleção, publicando só quando muda

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use super::{Colecao, DocumentStore, Documento, Escrita, Lote, Precondicao, Snapshot, StoreError, StoreResult};
use crate::config::settings::StoreSettings;

const PAGE_SIZE: u32 = 300;
const CAPACIDADE_CANAL: usize = 64;

type Canais = Arc<Mutex<HashMap<Colecao, broadcast::Sender<Snapshot>>>>;

struct Inner {
    http_client: HttpClient,
    base_url: String,
    database_path: String,
    token: Option<String>,
}

#[derive(Clone)]
pub struct FirestoreStore {
    inner: Arc<Inner>,
    poll_interval: Duration,
    canais: Canais,
}

impl FirestoreStore {
    pub fn new(settings: &StoreSettings) -> StoreResult<Self> {
        let project_id = settings
            .project_id
            .clone()
            .ok_or_else(|| StoreError::Config("store.project_id não configurado".to_string()))?;

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http_client,
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                database_path: format!("projects/{}/databases/{}", project_id, settings.database),
                token: settings.token.clone().filter(|t| !t.is_empty()),
            }),
            poll_interval: Duration::from_secs(settings.poll_interval_seconds.max(1)),
            canais: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

impl Inner {
    fn documents_url(&self) -> String {
        format!("{}/{}/documents", self.base_url, self.database_path)
    }

    fn document_url(&self, colecao: Colecao, id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.documents_url(),
            urlencoding::encode(colecao.nome()),
            urlencoding::encode(id)
        )
    }

    /// Nome completo do documento usado no corpo do commit
    fn document_name(&self, colecao: Colecao, id: &str) -> String {
        format!("{}/documents/{}/{}", self.database_path, colecao.nome(), id)
    }

    fn autenticar(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn checar(response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Backend { status: status.as_u16(), message })
    }

    async fn get(&self, colecao: Colecao, id: &str) -> StoreResult<Option<Value>> {
        let url = self.document_url(colecao, id);
        tracing::debug!("GET {}", url);

        let response = self.autenticar(self.http_client.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = Self::checar(response).await?.json().await?;
        Ok(Some(decodificar_documento(&body)))
    }

    async fn list(&self, colecao: Colecao) -> StoreResult<Vec<Documento>> {
        let url = format!("{}/{}", self.documents_url(), urlencoding::encode(colecao.nome()));
        let mut documentos = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = self.autenticar(request).send().await?;
            let body: Value = Self::checar(response).await?.json().await?;

            for doc in body.get("documents").and_then(|d| d.as_array()).into_iter().flatten() {
                let id = doc
                    .get("name")
                    .and_then(|n| n.as_str())
                    .and_then(|n| n.rsplit('/').next())
                    .unwrap_or_default()
                    .to_string();
                documentos.push(Documento { id, dados: decodificar_documento(doc) });
            }

            page_token = body
                .get("nextPageToken")
                .and_then(|t| t.as_str())
                .filter(|t| !t.is_empty())
                .map(String::from);
            if page_token.is_none() {
                break;
            }
        }

        documentos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(documentos)
    }

    fn corpo_commit(&self, lote: &Lote) -> Value {
        let writes: Vec<Value> = lote
            .escritas()
            .iter()
            .map(|escrita| {
                let mut write = match escrita {
                    Escrita::Set { colecao, id, dados, .. } => json!({
                        "update": {
                            "name": self.document_name(*colecao, id),
                            "fields": codificar_campos(dados),
                        }
                    }),
                    Escrita::Merge { colecao, id, campos, .. } => {
                        let mascara: Vec<String> = campos
                            .as_object()
                            .map(|m| m.keys().map(|k| format!("`{}`", k)).collect())
                            .unwrap_or_default();
                        json!({
                            "update": {
                                "name": self.document_name(*colecao, id),
                                "fields": codificar_campos(campos),
                            },
                            "updateMask": { "fieldPaths": mascara },
                        })
                    }
                    Escrita::Delete { colecao, id, .. } => json!({
                        "delete": self.document_name(*colecao, id),
                    }),
                };
                if let Some(precondicao) = escrita.precondicao() {
                    write["currentDocument"] = json!({ "exists": precondicao == Precondicao::Existe });
                }
                write
            })
            .collect();

        json!({ "writes": writes })
    }

    async fn commit(&self, lote: &Lote) -> StoreResult<()> {
        let url = format!("{}:commit", self.documents_url());
        tracing::debug!("POST {} ({} escrita(s))", url, lote.len());

        let response = self
            .autenticar(self.http_client.post(&url))
            .json(&self.corpo_commit(lote))
            .send()
            .await?;
        match Self::checar(response).await {
            Ok(_) => Ok(()),
            Err(StoreError::Backend { status, message }) if precondicao_falhou(status, &message) => {
                tracing::warn!("⚠️ Commit rejeitado por precondição: {}", message);
                Err(StoreError::Conflito(message))
            }
            Err(e) => Err(e),
        }
    }
}

/// `exists: false` violado volta 409 ALREADY_EXISTS; `exists: true` volta
/// 404 NOT_FOUND ou 400 FAILED_PRECONDITION
fn precondicao_falhou(status: u16, message: &str) -> bool {
    status == 409
        || status == 404
        || (status == 400 && message.contains("FAILED_PRECONDITION"))
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, colecao: Colecao, id: &str) -> StoreResult<Option<Value>> {
        self.inner.get(colecao, id).await
    }

    async fn list(&self, colecao: Colecao) -> StoreResult<Vec<Documento>> {
        self.inner.list(colecao).await
    }

    async fn commit(&self, lote: Lote) -> StoreResult<()> {
        if lote.is_empty() {
            return Ok(());
        }
        self.inner.commit(&lote).await
    }

    fn subscribe(&self, colecao: Colecao) -> broadcast::Receiver<Snapshot> {
        let mut canais = match self.canais.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(tx) = canais.get(&colecao) {
            return tx.subscribe();
        }

        let (tx, rx) = broadcast::channel(CAPACIDADE_CANAL);
        canais.insert(colecao, tx.clone());
        tokio::spawn(polling(
            self.inner.clone(),
            self.canais.clone(),
            colecao,
            self.poll_interval,
            tx,
        ));
        rx
    }
}

/// Consulta a coleção periodicamente; encerra quando não há mais assinantes e
/// tira o canal do mapa, para que a próxima assinatura inicie outro polling
async fn polling(
    inner: Arc<Inner>,
    canais: Canais,
    colecao: Colecao,
    intervalo: Duration,
    tx: broadcast::Sender<Snapshot>,
) {
    let mut ticker = tokio::time::interval(intervalo);
    let mut anterior: Option<Vec<Documento>> = None;

    tracing::info!("👀 Polling da coleção {} a cada {:?}", colecao, intervalo);

    loop {
        ticker.tick().await;
        if tx.receiver_count() == 0 {
            // subscribe() só assina com o mapa travado, então a contagem aqui é definitiva
            let mut canais = match canais.lock() {
                Ok(c) => c,
                Err(poisoned) => poisoned.into_inner(),
            };
            if tx.receiver_count() == 0 {
                canais.remove(&colecao);
                break;
            }
            continue;
        }

        match inner.list(colecao).await {
            Ok(documentos) => {
                if anterior.as_ref() != Some(&documentos) {
                    anterior = Some(documentos.clone());
                    let _ = tx.send(Snapshot { colecao, documentos });
                }
            }
            Err(e) => tracing::warn!("⚠️ Falha no polling de {}: {}", colecao, e),
        }
    }

    tracing::info!("Polling da coleção {} encerrado", colecao);
}

/// Converte um objeto JSON em `fields` do Firestore
pub fn codificar_campos(dados: &Value) -> Value {
    let campos: Map<String, Value> = dados
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), codificar_valor(v))).collect())
        .unwrap_or_default();
    Value::Object(campos)
}

pub fn codificar_valor(valor: &Value) -> Value {
    match valor {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(itens) => json!({
            "arrayValue": { "values": itens.iter().map(codificar_valor).collect::<Vec<_>>() }
        }),
        Value::Object(_) => json!({ "mapValue": { "fields": codificar_campos(valor) } }),
    }
}

/// Converte um documento do Firestore (`{name, fields}`) em JSON simples
pub fn decodificar_documento(documento: &Value) -> Value {
    decodificar_campos(documento.get("fields").unwrap_or(&Value::Null))
}

fn decodificar_campos(campos: &Value) -> Value {
    let mapa: Map<String, Value> = campos
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), decodificar_valor(v))).collect())
        .unwrap_or_default();
    Value::Object(mapa)
}

pub fn decodificar_valor(valor: &Value) -> Value {
    let Some((tipo, conteudo)) = valor.as_object().and_then(|m| m.iter().next()) else {
        return Value::Null;
    };

    match tipo.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => conteudo.clone(),
        "integerValue" => conteudo
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| conteudo.clone()),
        "doubleValue" => conteudo.clone(),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => conteudo.clone(),
        "arrayValue" => Value::Array(
            conteudo
                .get("values")
                .and_then(|v| v.as_array())
                .map(|itens| itens.iter().map(decodificar_valor).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => decodificar_campos(conteudo.get("fields").unwrap_or(&Value::Null)),
        _ => conteudo.clone(),
    }
}
