//! Acesso tipado aos protocolos
//!
//! Documentos vindos do banco são validados como [`Protocolo`] aqui; um
//! documento fora do esquema vira `StoreError::DocumentoInvalido`.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::models::Protocolo;
use crate::store::{Colecao, DocumentStore, Lote, StoreError, StoreResult};

#[derive(Clone)]
pub struct RepositorioProtocolos {
    store: Arc<dyn DocumentStore>,
}

impl RepositorioProtocolos {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn buscar(&self, colecao: Colecao, id: &str) -> StoreResult<Option<Protocolo>> {
        match self.store.get(colecao, id).await? {
            Some(doc) => Ok(Some(decodificar(colecao, id, doc)?)),
            None => Ok(None),
        }
    }

    /// Espelho em `protocolos`, pelo número do protocolo
    pub async fn buscar_espelho(&self, numero: &str) -> StoreResult<Option<Protocolo>> {
        self.buscar(Colecao::Protocolos, numero).await
    }

    /// Procura o protocolo nas coleções de status
    pub async fn localizar(&self, id: &str) -> StoreResult<Option<(Colecao, Protocolo)>> {
        for colecao in Colecao::STATUS {
            if let Some(protocolo) = self.buscar(colecao, id).await? {
                return Ok(Some((colecao, protocolo)));
            }
        }
        Ok(None)
    }

    pub async fn numero_existe(&self, numero: &str) -> StoreResult<bool> {
        self.store.exists(Colecao::Protocolos, numero).await
    }

    pub async fn listar(&self, colecao: Colecao) -> StoreResult<Vec<Protocolo>> {
        self.store
            .list(colecao)
            .await?
            .into_iter()
            .map(|doc| decodificar(colecao, &doc.id, doc.dados))
            .collect()
    }

    pub async fn commit(&self, lote: Lote) -> StoreResult<()> {
        self.store.commit(lote).await
    }
}

/// Valida um documento bruto contra o tipo esperado
pub fn decodificar<T: DeserializeOwned>(colecao: Colecao, id: &str, doc: Value) -> StoreResult<T> {
    serde_json::from_value(doc).map_err(|e| StoreError::DocumentoInvalido {
        colecao,
        id: id.to_string(),
        motivo: e.to_string(),
    })
}

/// Documento serializado de um protocolo
pub fn documento(protocolo: &Protocolo) -> StoreResult<Value> {
    Ok(serde_json::to_value(protocolo)?)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::models::{ClienteAfetado, StatusProtocolo, TipoProtocolo};
    use chrono::{DateTime, TimeZone, Utc};

    pub fn data(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    pub fn cliente(codigo: &str, telefone: Option<&str>, email: Option<&str>) -> ClienteAfetado {
        ClienteAfetado {
            nome: format!("Cliente {}", codigo),
            codigo: codigo.to_string(),
            telefone: telefone.map(String::from),
            email: email.map(String::from),
            origem: None,
            ponto_acesso: Some("OLT-RP-01".to_string()),
            whatsapp_confirmado: false,
            email_confirmado: false,
        }
    }

    pub fn protocolo(id: &str, numero: &str, status: StatusProtocolo) -> Protocolo {
        Protocolo {
            id: id.to_string(),
            numero: numero.to_string(),
            tipo: TipoProtocolo::Programada,
            status,
            data_inicial: data(10),
            data_prevista: Some(data(12)),
            data_final: None,
            data_ativacao: None,
            pontos_acesso: vec!["OLT-RP-01".to_string()],
            cidades: vec![],
            regiao: "Ribeirão Preto".to_string(),
            clientes_afetados: vec![],
            total_afetados: 0,
            email_enviado: false,
            whatsapp_enviado: false,
            comentarios: String::new(),
            motivo: None,
            dividida: vec![],
            status_exclusao: None,
            criado_em: data(9),
            atualizado_em: data(9),
        }
    }

    /// Grava o protocolo na coleção do status, no espelho e na auditoria
    pub async fn semear(store: &Arc<dyn DocumentStore>, protocolo: &Protocolo) {
        let doc = documento(protocolo).unwrap();
        let mut lote = Lote::new();
        if let Some(colecao) = Colecao::de_status(protocolo.status) {
            lote.set(colecao, protocolo.id.clone(), doc.clone());
        }
        lote.set(Colecao::Manutencao, protocolo.id.clone(), doc.clone())
            .set(Colecao::Protocolos, protocolo.numero.clone(), doc);
        store.commit(lote).await.unwrap();
    }
}
