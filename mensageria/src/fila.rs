//! Fila de entrega com retry por destinatário e rastreio de status

use crate::error::{EntregaError, Result};
use crate::remetente::Remetente;
use crate::{Canal, Mensagem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// Teto de espera entre tentativas
pub const BACKOFF_MAXIMO_MS: u64 = 30_000;

/// Configuração da fila
#[derive(Debug, Clone)]
pub struct ConfigFila {
    pub max_tentativas: u32,
    pub backoff_inicial_ms: u64,
    pub capacidade: usize,
    /// Despachos concluídos há mais tempo que isso saem do mapa de estados
    pub retencao: Duration,
}

impl Default for ConfigFila {
    fn default() -> Self {
        Self {
            max_tentativas: 3,
            backoff_inicial_ms: 100,
            capacidade: 256,
            retencao: Duration::from_secs(3600),
        }
    }
}

/// Espera antes da próxima tentativa: dobra a cada falha, limitada a [`BACKOFF_MAXIMO_MS`]
pub fn backoff_ms(config: &ConfigFila, tentativa: u32) -> u64 {
    2u64.checked_pow(tentativa.saturating_sub(1))
        .and_then(|fator| config.backoff_inicial_ms.checked_mul(fator))
        .unwrap_or(u64::MAX)
        .min(BACKOFF_MAXIMO_MS)
}

/// Um lote de mensagens de um mesmo canal, referente a um protocolo
#[derive(Debug, Clone)]
pub struct Despacho {
    pub id: String,
    pub canal: Canal,
    pub referencia: String,
    pub mensagens: Vec<Mensagem>,
}

impl Despacho {
    pub fn new(canal: Canal, referencia: impl Into<String>, mensagens: Vec<Mensagem>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            canal,
            referencia: referencia.into(),
            mensagens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEntrega {
    Pendente,
    Enviado,
    Falhou,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstadoDestinatario {
    pub destino: String,
    pub nome: String,
    pub codigo: String,
    pub status: StatusEntrega,
    pub tentativas: u32,
    pub erro: Option<String>,
}

/// Estado consultável de um despacho
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstadoDespacho {
    pub id: String,
    pub canal: Canal,
    pub referencia: String,
    pub destinatarios: Vec<EstadoDestinatario>,
    pub concluido: bool,
    pub criado_em: DateTime<Utc>,
    pub concluido_em: Option<DateTime<Utc>>,
}

impl EstadoDespacho {
    fn novo(despacho: &Despacho) -> Self {
        Self {
            id: despacho.id.clone(),
            canal: despacho.canal,
            referencia: despacho.referencia.clone(),
            destinatarios: despacho
                .mensagens
                .iter()
                .map(|m| EstadoDestinatario {
                    destino: m.destino.clone(),
                    nome: m.nome.clone(),
                    codigo: m.codigo.clone(),
                    status: StatusEntrega::Pendente,
                    tentativas: 0,
                    erro: None,
                })
                .collect(),
            concluido: false,
            criado_em: Utc::now(),
            concluido_em: None,
        }
    }

    pub fn enviados(&self) -> usize {
        self.destinatarios.iter().filter(|d| d.status == StatusEntrega::Enviado).count()
    }

    pub fn falhas(&self) -> impl Iterator<Item = &EstadoDestinatario> {
        self.destinatarios.iter().filter(|d| d.status == StatusEntrega::Falhou)
    }
}

type Callback = Arc<dyn Fn(EstadoDespacho) + Send + Sync>;

/// Fila de entrega: um worker consome despachos em ordem e envia
/// cada destinatário sequencialmente, com backoff exponencial entre tentativas.
#[derive(Clone)]
pub struct FilaEntrega {
    tx: mpsc::Sender<Despacho>,
    estados: Arc<RwLock<HashMap<String, EstadoDespacho>>>,
}

impl FilaEntrega {
    /// Inicia o worker da fila. Requer um runtime tokio ativo.
    pub fn iniciar(remetente: Arc<dyn Remetente>, config: ConfigFila) -> Self {
        Self::iniciar_com_callback(remetente, config, None)
    }

    /// Igual a `iniciar`, chamando `ao_concluir` ao fim de cada despacho
    pub fn iniciar_com_callback(
        remetente: Arc<dyn Remetente>,
        config: ConfigFila,
        ao_concluir: Option<Callback>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.capacidade.max(1));
        let estados = Arc::new(RwLock::new(HashMap::new()));

        tokio::spawn(worker(rx, remetente, config, estados.clone(), ao_concluir));
        tracing::info!("📬 Fila de entrega iniciada");

        Self { tx, estados }
    }

    /// Enfileira um despacho e retorna seu id imediatamente
    pub async fn enfileirar(&self, despacho: Despacho) -> Result<String> {
        let id = despacho.id.clone();
        self.estados
            .write()
            .await
            .insert(id.clone(), EstadoDespacho::novo(&despacho));

        if self.tx.send(despacho).await.is_err() {
            self.estados.write().await.remove(&id);
            return Err(EntregaError::FilaEncerrada);
        }

        tracing::info!("📥 Despacho {} enfileirado", id);
        Ok(id)
    }

    /// Estado atual de um despacho
    pub async fn status(&self, id: &str) -> Option<EstadoDespacho> {
        self.estados.read().await.get(id).cloned()
    }
}

async fn worker(
    mut rx: mpsc::Receiver<Despacho>,
    remetente: Arc<dyn Remetente>,
    config: ConfigFila,
    estados: Arc<RwLock<HashMap<String, EstadoDespacho>>>,
    ao_concluir: Option<Callback>,
) {
    while let Some(despacho) = rx.recv().await {
        tracing::info!(
            "🚚 Processando despacho {} ({}, {} destinatário(s), ref {})",
            despacho.id,
            despacho.canal,
            despacho.mensagens.len(),
            despacho.referencia
        );

        for (indice, mensagem) in despacho.mensagens.iter().enumerate() {
            let (tentativas, resultado) =
                entregar_com_retry(remetente.as_ref(), despacho.canal, mensagem, &config).await;

            let mut guard = estados.write().await;
            if let Some(estado) = guard.get_mut(&despacho.id) {
                if let Some(dest) = estado.destinatarios.get_mut(indice) {
                    dest.tentativas = tentativas;
                    match resultado {
                        Ok(()) => dest.status = StatusEntrega::Enviado,
                        Err(e) => {
                            dest.status = StatusEntrega::Falhou;
                            dest.erro = Some(e.to_string());
                        }
                    }
                }
            }
        }

        let final_state = {
            let mut guard = estados.write().await;
            let agora = Utc::now();
            let final_state = guard.get_mut(&despacho.id).map(|estado| {
                estado.concluido = true;
                estado.concluido_em = Some(agora);
                estado.clone()
            });
            let antes = guard.len();
            guard.retain(|id, estado| *id == despacho.id || !expirado(estado, agora, config.retencao));
            if guard.len() < antes {
                tracing::debug!("🧹 {} despacho(s) concluído(s) removido(s) do rastreio", antes - guard.len());
            }
            final_state
        };

        if let Some(estado) = final_state {
            tracing::info!(
                "✅ Despacho {} concluído: {}/{} enviados",
                estado.id,
                estado.enviados(),
                estado.destinatarios.len()
            );
            if let Some(cb) = &ao_concluir {
                cb(estado);
            }
        }
    }

    tracing::info!("🛑 Fila de entrega encerrada");
}

fn expirado(estado: &EstadoDespacho, agora: DateTime<Utc>, retencao: Duration) -> bool {
    match estado.concluido_em {
        Some(fim) if estado.concluido => (agora - fim).to_std().map(|idade| idade > retencao).unwrap_or(false),
        _ => false,
    }
}

async fn entregar_com_retry(
    remetente: &dyn Remetente,
    canal: Canal,
    mensagem: &Mensagem,
    config: &ConfigFila,
) -> (u32, Result<()>) {
    let max = config.max_tentativas.max(1);
    let mut tentativa = 1;

    loop {
        match remetente.enviar(canal, mensagem).await {
            Ok(()) => return (tentativa, Ok(())),
            Err(e) if tentativa < max => {
                let espera_ms = backoff_ms(config, tentativa);
                tracing::warn!(
                    "⚠️ Tentativa {}/{} falhou para {}: {}. Retry em {}ms...",
                    tentativa,
                    max,
                    mensagem.destino,
                    e,
                    espera_ms
                );
                tokio::time::sleep(Duration::from_millis(espera_ms)).await;
                tentativa += 1;
            }
            Err(e) => {
                tracing::error!(
                    "❌ Todas as {} tentativas falharam para {}: {}",
                    max,
                    mensagem.destino,
                    e
                );
                return (tentativa, Err(e));
            }
        }
    }
}
