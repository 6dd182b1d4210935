//! Transições de status dos protocolos
//!
//! Cada operação lê o documento de origem, calcula o destino pelo mapeamento
//! fixo e grava em UM lote atômico:
//! - documento completo na coleção do novo status (se houver)
//! - merge no espelho `protocolos/{numero}` e na auditoria `manutencao/{id}`
//! - remoção da coleção de origem
//!
//! Assim o protocolo nunca fica em duas coleções de status, nem some do espelho.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use super::repositorio::{documento, RepositorioProtocolos};
use crate::models::{Protocolo, StatusProtocolo};
use crate::store::{Colecao, Lote, StoreError};
use crate::utils::logging::*;

#[derive(Debug, Error)]
pub enum TransicaoError {
    #[error("Protocolo {0} não encontrado")]
    NaoEncontrado(String),

    #[error("Operação '{operacao}' não permitida para protocolo em {status}")]
    TransicaoInvalida {
        operacao: &'static str,
        status: StatusProtocolo,
    },

    #[error("Janela inválida: {0}")]
    JanelaInvalida(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type TransicaoResult<T> = Result<T, TransicaoError>;

/// Resultado informado ao concluir um protocolo ativo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "desfecho", rename_all = "snake_case")]
pub enum Desfecho {
    /// Manutenção executada
    Concluido,
    /// Não executada; volta como Reagendado com o código do motivo
    NaoConcluido { motivo: String },
}

/// Nova janela para um protocolo reagendado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NovaJanela {
    pub data_inicial: DateTime<Utc>,
    #[serde(default)]
    pub data_prevista: Option<DateTime<Utc>>,
}

/// Resumo de uma exclusão
#[derive(Debug, Clone, Serialize)]
pub struct Exclusao {
    pub id: String,
    pub numero: String,
    pub status_marcado: String,
    pub colecoes: Vec<Colecao>,
}

/// Analise → Pendente; Pendente e Reagendado → Ativos
pub fn destino_avanco(status: StatusProtocolo) -> TransicaoResult<StatusProtocolo> {
    match status {
        StatusProtocolo::Analise => Ok(StatusProtocolo::Pendente),
        StatusProtocolo::Pendente | StatusProtocolo::Reagendado => Ok(StatusProtocolo::Ativos),
        outro => Err(TransicaoError::TransicaoInvalida { operacao: "avancar", status: outro }),
    }
}

#[derive(Clone)]
pub struct ServicoTransicoes {
    repo: RepositorioProtocolos,
}

impl ServicoTransicoes {
    pub fn new(repo: RepositorioProtocolos) -> Self {
        Self { repo }
    }

    async fn localizar(&self, id: &str) -> TransicaoResult<(Colecao, Protocolo)> {
        self.repo
            .localizar(id)
            .await?
            .ok_or_else(|| TransicaoError::NaoEncontrado(id.to_string()))
    }

    /// Grava `novo` no destino, espelho e auditoria, removendo da origem, num só lote.
    /// O lote exige que a origem ainda exista e o destino ainda não: se outra
    /// transição chegou antes, nada é gravado e a operação vira `TransicaoInvalida`.
    async fn mover(
        &self,
        operacao: &'static str,
        de: StatusProtocolo,
        origem: Option<Colecao>,
        novo: Protocolo,
    ) -> TransicaoResult<Protocolo> {
        let doc = documento(&novo)?;
        let destino = Colecao::de_status(novo.status);

        let mut lote = Lote::new();
        if let Some(destino) = destino {
            if origem == Some(destino) {
                lote.set(destino, novo.id.clone(), doc.clone());
            } else {
                lote.criar(destino, novo.id.clone(), doc.clone());
            }
        }
        lote.merge(Colecao::Protocolos, novo.numero.clone(), doc.clone())
            .merge(Colecao::Manutencao, novo.id.clone(), doc);
        if let Some(origem) = origem.filter(|o| Some(*o) != destino) {
            lote.remover_existente(origem, novo.id.clone());
        }

        match self.repo.commit(lote).await {
            Ok(()) => {}
            Err(StoreError::Conflito(motivo)) => {
                tracing::warn!("⚠️ Protocolo {} mudou durante '{}': {}", novo.numero, operacao, motivo);
                return Err(TransicaoError::TransicaoInvalida { operacao, status: de });
            }
            Err(e) => {
                log_store_error("transicao", &e.to_string());
                return Err(e.into());
            }
        }

        log_transicao(
            &novo.numero,
            origem.map(|o| o.nome()).unwrap_or("concluídos"),
            novo.status.nome(),
        );
        Ok(novo)
    }

    pub async fn avancar(&self, id: &str, em: DateTime<Utc>) -> TransicaoResult<Protocolo> {
        let (origem, atual) = self.localizar(id).await?;
        let status = destino_avanco(atual.status)?;
        let de = atual.status;

        let mut novo = atual;
        novo.status = status;
        novo.atualizado_em = em;
        if status == StatusProtocolo::Ativos {
            novo.data_ativacao = Some(em);
        }

        self.mover("avancar", de, Some(origem), novo).await
    }

    pub async fn concluir(&self, id: &str, desfecho: Desfecho, em: DateTime<Utc>) -> TransicaoResult<Protocolo> {
        let (origem, atual) = self.localizar(id).await?;
        if atual.status != StatusProtocolo::Ativos {
            return Err(TransicaoError::TransicaoInvalida { operacao: "concluir", status: atual.status });
        }
        let de = atual.status;

        let mut novo = atual;
        novo.atualizado_em = em;
        match desfecho {
            Desfecho::Concluido => {
                novo.status = if novo.atrasado_em(em) {
                    StatusProtocolo::ConcluidoComAtraso
                } else {
                    StatusProtocolo::Concluido
                };
                novo.data_final = Some(em);
                novo.motivo = None;
            }
            Desfecho::NaoConcluido { motivo } => {
                novo.status = StatusProtocolo::Reagendado;
                novo.data_final = None;
                novo.motivo = Some(motivo);
            }
        }

        self.mover("concluir", de, Some(origem), novo).await
    }

    pub async fn reagendar(&self, id: &str, janela: NovaJanela, em: DateTime<Utc>) -> TransicaoResult<Protocolo> {
        if let Some(prevista) = janela.data_prevista {
            if prevista <= janela.data_inicial {
                return Err(TransicaoError::JanelaInvalida(
                    "data prevista deve ser posterior à data inicial".to_string(),
                ));
            }
        }

        let (origem, atual) = self.localizar(id).await?;
        if atual.status != StatusProtocolo::Reagendado {
            return Err(TransicaoError::TransicaoInvalida { operacao: "reagendar", status: atual.status });
        }
        let de = atual.status;

        let mut novo = atual;
        novo.status = StatusProtocolo::Analise;
        novo.data_inicial = janela.data_inicial;
        novo.data_prevista = janela.data_prevista;
        novo.data_final = None;
        novo.data_ativacao = None;
        novo.motivo = None;
        novo.atualizado_em = em;

        self.mover("reagendar", de, Some(origem), novo).await
    }

    /// Devolve um protocolo concluído para Ativos
    pub async fn reabrir(&self, id: &str, em: DateTime<Utc>) -> TransicaoResult<Protocolo> {
        if let Some((_, ativo)) = self.repo.localizar(id).await? {
            return Err(TransicaoError::TransicaoInvalida { operacao: "reabrir", status: ativo.status });
        }

        let atual = self
            .repo
            .buscar(Colecao::Manutencao, id)
            .await?
            .ok_or_else(|| TransicaoError::NaoEncontrado(id.to_string()))?;
        if !atual.status.concluido() {
            return Err(TransicaoError::TransicaoInvalida { operacao: "reabrir", status: atual.status });
        }
        let de = atual.status;

        let mut novo = atual;
        novo.status = StatusProtocolo::Ativos;
        novo.data_final = None;
        novo.data_ativacao = Some(em);
        novo.motivo = None;
        novo.atualizado_em = em;

        self.mover("reabrir", de, None, novo).await
    }

    /// Marca o espelho como excluído e remove todas as cópias do protocolo
    pub async fn excluir(&self, id: &str) -> TransicaoResult<Exclusao> {
        let protocolo = match self.repo.localizar(id).await? {
            Some((_, p)) => p,
            None => self
                .repo
                .buscar(Colecao::Manutencao, id)
                .await?
                .ok_or_else(|| TransicaoError::NaoEncontrado(id.to_string()))?,
        };

        let status_marcado = format!("{} (Excluído)", protocolo.status);
        let mut marca = Lote::new();
        marca.merge(
            Colecao::Protocolos,
            protocolo.numero.clone(),
            json!({ "status_exclusao": status_marcado }),
        );
        self.repo.commit(marca).await?;

        let store = self.repo.store();
        let mut colecoes = Vec::new();
        let mut lote = Lote::new();
        for colecao in Colecao::STATUS.into_iter().chain([Colecao::Manutencao]) {
            if store.exists(colecao, id).await? {
                colecoes.push(colecao);
            }
            lote.delete(colecao, id.to_string());
        }
        lote.delete(Colecao::Protocolos, protocolo.numero.clone());
        colecoes.push(Colecao::Protocolos);

        self.repo.commit(lote).await?;
        log_protocolo_excluido(&protocolo.numero, colecoes.len());

        Ok(Exclusao {
            id: id.to_string(),
            numero: protocolo.numero,
            status_marcado,
            colecoes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::repositorio::fixtures::*;
    use crate::store::{DocumentStore, Documento, MemoryStore, Snapshot, StoreResult};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    fn servico() -> (Arc<dyn DocumentStore>, RepositorioProtocolos, ServicoTransicoes) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let repo = RepositorioProtocolos::new(store.clone());
        (store, repo.clone(), ServicoTransicoes::new(repo))
    }

    fn servico_lento() -> (Arc<dyn DocumentStore>, RepositorioProtocolos, ServicoTransicoes) {
        let store: Arc<dyn DocumentStore> = Arc::new(StoreLento(MemoryStore::new()));
        let repo = RepositorioProtocolos::new(store.clone());
        (store, repo.clone(), ServicoTransicoes::new(repo))
    }

    /// Cede a vez antes de cada leitura, intercalando operações concorrentes
    struct StoreLento(MemoryStore);

    #[async_trait]
    impl DocumentStore for StoreLento {
        async fn get(&self, colecao: Colecao, id: &str) -> StoreResult<Option<Value>> {
            tokio::task::yield_now().await;
            self.0.get(colecao, id).await
        }

        async fn list(&self, colecao: Colecao) -> StoreResult<Vec<Documento>> {
            tokio::task::yield_now().await;
            self.0.list(colecao).await
        }

        async fn commit(&self, lote: Lote) -> StoreResult<()> {
            self.0.commit(lote).await
        }

        fn subscribe(&self, colecao: Colecao) -> broadcast::Receiver<Snapshot> {
            self.0.subscribe(colecao)
        }
    }

    /// Cópias em coleções de status, sem contar espelho e auditoria
    async fn copias(store: &Arc<dyn DocumentStore>, id: &str) -> Vec<Colecao> {
        let mut encontradas = Vec::new();
        for colecao in Colecao::STATUS {
            if store.exists(colecao, id).await.unwrap() {
                encontradas.push(colecao);
            }
        }
        encontradas
    }

    #[test]
    fn test_advance_mapping() {
        assert_eq!(destino_avanco(StatusProtocolo::Analise).unwrap(), StatusProtocolo::Pendente);
        assert_eq!(destino_avanco(StatusProtocolo::Pendente).unwrap(), StatusProtocolo::Ativos);
        assert_eq!(destino_avanco(StatusProtocolo::Reagendado).unwrap(), StatusProtocolo::Ativos);
        assert!(destino_avanco(StatusProtocolo::Ativos).is_err());
        assert!(destino_avanco(StatusProtocolo::Concluido).is_err());
    }

    #[tokio::test]
    async fn test_avancar_moves_document_and_syncs_mirror() {
        let (store, repo, servico) = servico();
        semear(&store, &protocolo("p1", "12345", StatusProtocolo::Analise)).await;

        let novo = servico.avancar("p1", data(11)).await.unwrap();
        assert_eq!(novo.status, StatusProtocolo::Pendente);
        assert_eq!(copias(&store, "p1").await, vec![Colecao::Pendente]);

        let pendente = repo.buscar(Colecao::Pendente, "p1").await.unwrap().unwrap();
        assert_eq!(repo.buscar_espelho("12345").await.unwrap().unwrap(), pendente);
        assert_eq!(repo.buscar(Colecao::Manutencao, "p1").await.unwrap().unwrap(), pendente);

        let ativo = servico.avancar("p1", data(12)).await.unwrap();
        assert_eq!(ativo.status, StatusProtocolo::Ativos);
        assert_eq!(ativo.data_ativacao, Some(data(12)));
        assert_eq!(copias(&store, "p1").await, vec![Colecao::Ativos]);

        let err = servico.avancar("p1", data(13)).await.unwrap_err();
        assert!(matches!(err, TransicaoError::TransicaoInvalida { status: StatusProtocolo::Ativos, .. }));
        assert!(matches!(
            servico.avancar("nada", data(13)).await.unwrap_err(),
            TransicaoError::NaoEncontrado(_)
        ));
    }

    #[tokio::test]
    async fn test_reschedule_round_trip_converges() {
        let (store, repo, servico) = servico();
        let janela = NovaJanela { data_inicial: data(14), data_prevista: Some(data(16)) };

        // Caminho A: avança até Ativos, não conclui, reagenda e avança de novo
        semear(&store, &protocolo("a", "1", StatusProtocolo::Analise)).await;
        servico.avancar("a", data(10)).await.unwrap();
        servico.avancar("a", data(11)).await.unwrap();
        let reag = servico
            .concluir("a", Desfecho::NaoConcluido { motivo: "CHUVA".to_string() }, data(12))
            .await
            .unwrap();
        assert_eq!(reag.status, StatusProtocolo::Reagendado);
        assert_eq!(reag.motivo.as_deref(), Some("CHUVA"));
        servico.reagendar("a", janela.clone(), data(13)).await.unwrap();
        servico.avancar("a", data(20)).await.unwrap();
        let a = servico.avancar("a", data(21)).await.unwrap();

        // Caminho B: criado já com a nova janela
        let mut b = protocolo("b", "2", StatusProtocolo::Analise);
        b.data_inicial = janela.data_inicial;
        b.data_prevista = janela.data_prevista;
        semear(&store, &b).await;
        servico.avancar("b", data(20)).await.unwrap();
        let b = servico.avancar("b", data(21)).await.unwrap();

        assert_eq!(a.status, b.status);
        assert_eq!(a.data_inicial, b.data_inicial);
        assert_eq!(a.data_prevista, b.data_prevista);
        assert_eq!(a.data_final, b.data_final);
        assert_eq!(a.data_ativacao, b.data_ativacao);
        assert_eq!(a.motivo, b.motivo);
        assert_eq!(a.atualizado_em, b.atualizado_em);
        assert_eq!(repo.buscar_espelho("1").await.unwrap().unwrap().status, StatusProtocolo::Ativos);
    }

    #[tokio::test]
    async fn test_concluir_late_leaves_only_mirror_and_audit() {
        let (store, repo, servico) = servico();
        semear(&store, &protocolo("p1", "77", StatusProtocolo::Ativos)).await;

        let concluido = servico.concluir("p1", Desfecho::Concluido, data(13)).await.unwrap();
        assert_eq!(concluido.status, StatusProtocolo::ConcluidoComAtraso);
        assert_eq!(concluido.data_final, Some(data(13)));
        assert!(copias(&store, "p1").await.is_empty());
        assert_eq!(
            repo.buscar_espelho("77").await.unwrap().unwrap().status,
            StatusProtocolo::ConcluidoComAtraso
        );

        let reaberto = servico.reabrir("p1", data(14)).await.unwrap();
        assert_eq!(reaberto.status, StatusProtocolo::Ativos);
        assert_eq!(reaberto.data_final, None);
        assert_eq!(copias(&store, "p1").await, vec![Colecao::Ativos]);
        assert!(servico.reabrir("p1", data(15)).await.is_err());
    }

    #[tokio::test]
    async fn test_reagendar_requires_reagendado_and_valid_window() {
        let (store, _repo, servico) = servico();
        semear(&store, &protocolo("p1", "5", StatusProtocolo::Pendente)).await;

        let janela = NovaJanela { data_inicial: data(14), data_prevista: Some(data(13)) };
        assert!(matches!(
            servico.reagendar("p1", janela, data(10)).await.unwrap_err(),
            TransicaoError::JanelaInvalida(_)
        ));
        let janela = NovaJanela { data_inicial: data(14), data_prevista: None };
        assert!(matches!(
            servico.reagendar("p1", janela, data(10)).await.unwrap_err(),
            TransicaoError::TransicaoInvalida { operacao: "reagendar", .. }
        ));
    }

    #[tokio::test]
    async fn test_excluir_removes_every_copy() {
        let (store, _repo, servico) = servico();
        semear(&store, &protocolo("p1", "999", StatusProtocolo::Ativos)).await;

        let exclusao = servico.excluir("p1").await.unwrap();
        assert_eq!(exclusao.status_marcado, "Ativos (Excluído)");
        assert_eq!(
            exclusao.colecoes,
            vec![Colecao::Ativos, Colecao::Manutencao, Colecao::Protocolos]
        );

        for colecao in Colecao::STATUS {
            assert!(!store.exists(colecao, "p1").await.unwrap());
        }
        assert!(!store.exists(Colecao::Manutencao, "p1").await.unwrap());
        assert!(!store.exists(Colecao::Protocolos, "999").await.unwrap());
        assert!(matches!(servico.excluir("p1").await.unwrap_err(), TransicaoError::NaoEncontrado(_)));
    }

    #[tokio::test]
    async fn test_concurrent_conclusions_only_one_applies() {
        let (store, repo, servico) = servico_lento();
        semear(&store, &protocolo("p1", "321", StatusProtocolo::Ativos)).await;

        let (a, b) = tokio::join!(
            servico.concluir("p1", Desfecho::NaoConcluido { motivo: "CHUVA".to_string() }, data(11)),
            servico.concluir("p1", Desfecho::Concluido, data(11))
        );

        let vencedor = match (a, b) {
            (Ok(p), Err(e)) | (Err(e), Ok(p)) => {
                assert!(matches!(e, TransicaoError::TransicaoInvalida { operacao: "concluir", .. }));
                p
            }
            (a, b) => panic!("esperava exatamente um sucesso: {:?} / {:?}", a.is_ok(), b.is_ok()),
        };

        let espelho = repo.buscar_espelho("321").await.unwrap().unwrap();
        assert_eq!(espelho.status, vencedor.status);
        let esperado: Vec<Colecao> = Colecao::de_status(vencedor.status).into_iter().collect();
        assert_eq!(copias(&store, "p1").await, esperado);
    }

    #[tokio::test]
    async fn test_concurrent_reopen_creates_single_copy() {
        let (store, _repo, servico) = servico_lento();
        semear(&store, &protocolo("p1", "88", StatusProtocolo::Ativos)).await;
        servico.concluir("p1", Desfecho::Concluido, data(11)).await.unwrap();

        let (a, b) = tokio::join!(servico.reabrir("p1", data(12)), servico.reabrir("p1", data(12)));
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(copias(&store, "p1").await, vec![Colecao::Ativos]);
    }
}
