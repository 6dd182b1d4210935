//! Armazenamento de documentos
//!
//! Todas as gravações que tocam mais de uma coleção passam por um [`Lote`],
//! aplicado de forma atômica por [`DocumentStore::commit`]: ou todas as escritas
//! valem, ou nenhuma.

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::StatusProtocolo;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

/// Coleções de nível superior do banco
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Colecao {
    Analise,
    Pendente,
    Ativos,
    Reagendado,
    Protocolos,
    Manutencao,
    Requisicao,
    Email,
    Messages,
    ErrorContatos,
    Users,
}

impl Colecao {
    /// Coleções que particionam os protocolos por status
    pub const STATUS: [Colecao; 4] = [
        Colecao::Analise,
        Colecao::Pendente,
        Colecao::Ativos,
        Colecao::Reagendado,
    ];

    pub fn nome(&self) -> &'static str {
        match self {
            Colecao::Analise => "Analise",
            Colecao::Pendente => "Pendente",
            Colecao::Ativos => "Ativos",
            Colecao::Reagendado => "Reagendado",
            Colecao::Protocolos => "protocolos",
            Colecao::Manutencao => "manutencao",
            Colecao::Requisicao => "Requisição",
            Colecao::Email => "email",
            Colecao::Messages => "messages",
            Colecao::ErrorContatos => "ErrorContatos",
            Colecao::Users => "users",
        }
    }

    /// Coleção de status correspondente; concluídos e cancelados não têm
    pub fn de_status(status: StatusProtocolo) -> Option<Colecao> {
        match status {
            StatusProtocolo::Analise => Some(Colecao::Analise),
            StatusProtocolo::Pendente => Some(Colecao::Pendente),
            StatusProtocolo::Ativos => Some(Colecao::Ativos),
            StatusProtocolo::Reagendado => Some(Colecao::Reagendado),
            _ => None,
        }
    }
}

impl fmt::Display for Colecao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nome())
    }
}

/// Documento com seu id
#[derive(Debug, Clone, PartialEq)]
pub struct Documento {
    pub id: String,
    pub dados: Value,
}

/// Conteúdo completo de uma coleção num instante
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub colecao: Colecao,
    pub documentos: Vec<Documento>,
}

/// Condição sobre o documento alvo, verificada no commit antes de qualquer escrita
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondicao {
    Existe,
    NaoExiste,
}

impl Precondicao {
    pub fn satisfeita(&self, existe: bool) -> bool {
        match self {
            Precondicao::Existe => existe,
            Precondicao::NaoExiste => !existe,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Escrita {
    /// Substitui o documento inteiro
    Set {
        colecao: Colecao,
        id: String,
        dados: Value,
        precondicao: Option<Precondicao>,
    },
    /// Cria ou atualiza apenas os campos de primeiro nível informados
    Merge {
        colecao: Colecao,
        id: String,
        campos: Value,
        precondicao: Option<Precondicao>,
    },
    Delete {
        colecao: Colecao,
        id: String,
        precondicao: Option<Precondicao>,
    },
}

impl Escrita {
    pub fn colecao(&self) -> Colecao {
        match self {
            Escrita::Set { colecao, .. } | Escrita::Merge { colecao, .. } | Escrita::Delete { colecao, .. } => *colecao,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Escrita::Set { id, .. } | Escrita::Merge { id, .. } | Escrita::Delete { id, .. } => id,
        }
    }

    pub fn precondicao(&self) -> Option<Precondicao> {
        match self {
            Escrita::Set { precondicao, .. }
            | Escrita::Merge { precondicao, .. }
            | Escrita::Delete { precondicao, .. } => *precondicao,
        }
    }
}

/// Lote de escritas aplicado atomicamente, na ordem de inserção
#[derive(Debug, Clone, Default)]
pub struct Lote {
    escritas: Vec<Escrita>,
}

impl Lote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, colecao: Colecao, id: impl Into<String>, dados: Value) -> &mut Self {
        self.escritas.push(Escrita::Set { colecao, id: id.into(), dados, precondicao: None });
        self
    }

    /// Grava o documento; o lote falha com [`StoreError::Conflito`] se ele já existir
    pub fn criar(&mut self, colecao: Colecao, id: impl Into<String>, dados: Value) -> &mut Self {
        self.escritas.push(Escrita::Set {
            colecao,
            id: id.into(),
            dados,
            precondicao: Some(Precondicao::NaoExiste),
        });
        self
    }

    pub fn merge(&mut self, colecao: Colecao, id: impl Into<String>, campos: Value) -> &mut Self {
        self.escritas.push(Escrita::Merge { colecao, id: id.into(), campos, precondicao: None });
        self
    }

    /// Merge que nunca cria: o lote falha se o documento não existir
    pub fn atualizar(&mut self, colecao: Colecao, id: impl Into<String>, campos: Value) -> &mut Self {
        self.escritas.push(Escrita::Merge {
            colecao,
            id: id.into(),
            campos,
            precondicao: Some(Precondicao::Existe),
        });
        self
    }

    pub fn delete(&mut self, colecao: Colecao, id: impl Into<String>) -> &mut Self {
        self.escritas.push(Escrita::Delete { colecao, id: id.into(), precondicao: None });
        self
    }

    /// Remove o documento; o lote falha se ele já tiver sumido
    pub fn remover_existente(&mut self, colecao: Colecao, id: impl Into<String>) -> &mut Self {
        self.escritas.push(Escrita::Delete {
            colecao,
            id: id.into(),
            precondicao: Some(Precondicao::Existe),
        });
        self
    }

    pub fn escritas(&self) -> &[Escrita] {
        &self.escritas
    }

    pub fn len(&self) -> usize {
        self.escritas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.escritas.is_empty()
    }

    /// Coleções tocadas pelo lote, sem repetição
    pub fn colecoes(&self) -> Vec<Colecao> {
        let mut colecoes: Vec<Colecao> = self.escritas.iter().map(Escrita::colecao).collect();
        colecoes.sort();
        colecoes.dedup();
        colecoes
    }
}

/// Erros do armazenamento de documentos
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend error (status {status}): {message}")]
    Backend { status: u16, message: String },

    /// Documento não corresponde ao esquema esperado
    #[error("Documento inválido em {colecao}/{id}: {motivo}")]
    DocumentoInvalido { colecao: Colecao, id: String, motivo: String },

    /// Precondição de alguma escrita falhou; nada do lote foi aplicado
    #[error("Conflito de escrita: {0}")]
    Conflito(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, colecao: Colecao, id: &str) -> StoreResult<Option<Value>>;

    async fn list(&self, colecao: Colecao) -> StoreResult<Vec<Documento>>;

    async fn exists(&self, colecao: Colecao, id: &str) -> StoreResult<bool> {
        Ok(self.get(colecao, id).await?.is_some())
    }

    /// Aplica todas as escritas do lote atomicamente
    async fn commit(&self, lote: Lote) -> StoreResult<()>;

    /// Recebe um snapshot da coleção a cada mudança
    fn subscribe(&self, colecao: Colecao) -> broadcast::Receiver<Snapshot>;
}

/// Merge raso: campos de primeiro nível de `campos` sobrescrevem os de `destino`
pub fn mesclar(destino: &mut Value, campos: &Value) {
    match (destino.as_object_mut(), campos.as_object()) {
        (Some(dest), Some(novos)) => {
            for (chave, valor) in novos {
                dest.insert(chave.clone(), valor.clone());
            }
        }
        _ => *destino = campos.clone(),
    }
}
