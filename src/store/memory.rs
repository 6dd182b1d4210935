use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio::sync::{broadcast, RwLock};

use super::{mesclar, Colecao, DocumentStore, Documento, Escrita, Lote, Snapshot, StoreError, StoreResult};

const CAPACIDADE_CANAL: usize = 64;

type Tabela = HashMap<Colecao, BTreeMap<String, Value>>;

/// Armazenamento em memória; o lote inteiro é verificado, aplicado e publicado
/// sob um único lock de escrita
pub struct MemoryStore {
    dados: RwLock<Tabela>,
    canais: Mutex<HashMap<Colecao, broadcast::Sender<Snapshot>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            dados: RwLock::new(HashMap::new()),
            canais: Mutex::new(HashMap::new()),
        }
    }

    fn snapshot(tabela: &Tabela, colecao: Colecao) -> Snapshot {
        let documentos = tabela
            .get(&colecao)
            .map(|docs| {
                docs.iter()
                    .map(|(id, dados)| Documento { id: id.clone(), dados: dados.clone() })
                    .collect()
            })
            .unwrap_or_default();
        Snapshot { colecao, documentos }
    }

    fn publicar(&self, snapshots: Vec<Snapshot>) {
        let canais = match self.canais.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };
        for snapshot in snapshots {
            if let Some(tx) = canais.get(&snapshot.colecao) {
                // sem assinantes ativos não é erro
                let _ = tx.send(snapshot);
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, colecao: Colecao, id: &str) -> StoreResult<Option<Value>> {
        let dados = self.dados.read().await;
        Ok(dados.get(&colecao).and_then(|docs| docs.get(id)).cloned())
    }

    async fn list(&self, colecao: Colecao) -> StoreResult<Vec<Documento>> {
        let dados = self.dados.read().await;
        Ok(Self::snapshot(&dados, colecao).documentos)
    }

    async fn commit(&self, lote: Lote) -> StoreResult<()> {
        let mut dados = self.dados.write().await;

        // todas as precondições antes de qualquer escrita: o lote falha inteiro
        for escrita in lote.escritas() {
            if let Some(precondicao) = escrita.precondicao() {
                let existe = dados
                    .get(&escrita.colecao())
                    .map(|docs| docs.contains_key(escrita.id()))
                    .unwrap_or(false);
                if !precondicao.satisfeita(existe) {
                    return Err(StoreError::Conflito(format!(
                        "{}/{} ({:?})",
                        escrita.colecao(),
                        escrita.id(),
                        precondicao
                    )));
                }
            }
        }

        for escrita in lote.escritas() {
            match escrita {
                Escrita::Set { colecao, id, dados: doc, .. } => {
                    dados.entry(*colecao).or_default().insert(id.clone(), doc.clone());
                }
                Escrita::Merge { colecao, id, campos, .. } => {
                    let docs = dados.entry(*colecao).or_default();
                    let atual = docs
                        .entry(id.clone())
                        .or_insert_with(|| Value::Object(Default::default()));
                    mesclar(atual, campos);
                }
                Escrita::Delete { colecao, id, .. } => {
                    if let Some(docs) = dados.get_mut(colecao) {
                        docs.remove(id);
                    }
                }
            }
        }

        let snapshots = lote
            .colecoes()
            .into_iter()
            .map(|c| Self::snapshot(&dados, c))
            .collect::<Vec<_>>();

        // publica ainda com o lock de escrita: assinantes veem os snapshots na ordem dos commits
        self.publicar(snapshots);
        drop(dados);
        Ok(())
    }

    fn subscribe(&self, colecao: Colecao) -> broadcast::Receiver<Snapshot> {
        let mut canais = match self.canais.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };
        canais
            .entry(colecao)
            .or_insert_with(|| broadcast::channel(CAPACIDADE_CANAL).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_commit_applies_all_writes() {
        let store = MemoryStore::new();
        let mut lote = Lote::new();
        lote.set(Colecao::Analise, "a1", json!({"numero": "1"}))
            .merge(Colecao::Protocolos, "1", json!({"status": "Analise"}));
        store.commit(lote).await.unwrap();

        let mut lote = Lote::new();
        lote.set(Colecao::Pendente, "a1", json!({"numero": "1"}))
            .merge(Colecao::Protocolos, "1", json!({"status": "Pendente", "extra": true}))
            .delete(Colecao::Analise, "a1");
        store.commit(lote).await.unwrap();

        assert!(!store.exists(Colecao::Analise, "a1").await.unwrap());
        assert!(store.exists(Colecao::Pendente, "a1").await.unwrap());
        assert_eq!(
            store.get(Colecao::Protocolos, "1").await.unwrap(),
            Some(json!({"status": "Pendente", "extra": true}))
        );
    }

    #[tokio::test]
    async fn test_subscribe_receives_snapshot_after_commit() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe(Colecao::Ativos);

        let mut lote = Lote::new();
        lote.set(Colecao::Ativos, "x", json!({"v": 1}));
        store.commit(lote).await.unwrap();

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.colecao, Colecao::Ativos);
        assert_eq!(snapshot.documentos.len(), 1);
        assert_eq!(snapshot.documentos[0].id, "x");
    }

    #[tokio::test]
    async fn test_failed_precondition_applies_nothing() {
        let store = MemoryStore::new();
        let mut lote = Lote::new();
        lote.criar(Colecao::Protocolos, "1", json!({"numero": "1"}));
        store.commit(lote).await.unwrap();

        let mut lote = Lote::new();
        lote.set(Colecao::Analise, "b", json!({}))
            .criar(Colecao::Protocolos, "1", json!({"numero": "outro"}));
        let err = store.commit(lote).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflito(_)));
        assert!(!store.exists(Colecao::Analise, "b").await.unwrap());
        assert_eq!(
            store.get(Colecao::Protocolos, "1").await.unwrap(),
            Some(json!({"numero": "1"}))
        );

        let mut lote = Lote::new();
        lote.atualizar(Colecao::Ativos, "sumiu", json!({"v": 1}));
        assert!(store.commit(lote).await.is_err());
        assert!(!store.exists(Colecao::Ativos, "sumiu").await.unwrap());

        let mut lote = Lote::new();
        lote.remover_existente(Colecao::Pendente, "sumiu");
        assert!(matches!(store.commit(lote).await, Err(StoreError::Conflito(_))));
    }

    #[tokio::test]
    async fn test_snapshots_follow_commit_order() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut rx = store.subscribe(Colecao::Ativos);

        let tarefas: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut lote = Lote::new();
                    lote.set(Colecao::Ativos, "x", json!({"v": i}));
                    store.commit(lote).await.unwrap();
                })
            })
            .collect();
        for tarefa in tarefas {
            tarefa.await.unwrap();
        }

        let mut ultimo = None;
        while let Ok(snapshot) = rx.try_recv() {
            ultimo = Some(snapshot);
        }
        let ultimo = ultimo.unwrap();
        assert_eq!(
            Some(ultimo.documentos[0].dados.clone()),
            store.get(Colecao::Ativos, "x").await.unwrap()
        );
    }
}
