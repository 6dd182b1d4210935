//! Estado do painel: lista de protocolos mesclada a partir dos snapshots ao vivo
//! das coleções de status, contagens e consultas paginadas.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::repositorio::decodificar;
use crate::models::{ClienteAfetado, Protocolo, StatusProtocolo};
use crate::store::{Colecao, DocumentStore, Snapshot};
use crate::utils::normalization::contem_normalizado;

pub const POR_PAGINA: usize = 20;

/// Versão exibida de um protocolo
#[derive(Debug, Clone, Copy)]
struct Entrada<'a> {
    colecao: Colecao,
    protocolo: &'a Protocolo,
}

/// Lista em memória de protocolos, deduplicada por id
///
/// Cada id guarda uma versão por coleção de status que ainda o contém, já que
/// os snapshots das coleções chegam fora de ordem. Exibe-se a versão mais
/// recente por `atualizado_em`; o id só sai do painel quando nenhuma coleção
/// o contém mais.
#[derive(Debug, Clone)]
pub struct PainelState {
    membros: HashMap<String, HashMap<Colecao, Protocolo>>,
    por_pagina: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Contagens {
    pub analise: usize,
    pub pendente: usize,
    pub ativos: usize,
    pub reagendado: usize,
    pub total: usize,
    /// Soma de `total_afetados` dos protocolos ativos
    pub clientes_afetados: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FiltroPainel {
    pub status: Option<StatusProtocolo>,
    pub busca: Option<String>,
    pub pagina: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagina<T> {
    pub itens: Vec<T>,
    pub pagina: usize,
    pub por_pagina: usize,
    pub total_itens: usize,
    pub total_paginas: usize,
}

impl<T: Clone> Pagina<T> {
    /// Página 1-based; fora do intervalo retorna vazia
    pub fn de(itens: &[T], pagina: usize, por_pagina: usize) -> Self {
        let pagina = pagina.max(1);
        let por_pagina = por_pagina.max(1);
        let total_itens = itens.len();
        let total_paginas = total_itens.div_ceil(por_pagina);
        let inicio = (pagina - 1).saturating_mul(por_pagina);

        let fatia = if inicio < total_itens {
            itens[inicio..(inicio + por_pagina).min(total_itens)].to_vec()
        } else {
            Vec::new()
        };

        Self {
            itens: fatia,
            pagina,
            por_pagina,
            total_itens,
            total_paginas,
        }
    }
}

/// Linha da visão "Clientes Afetados"
#[derive(Debug, Clone, Serialize)]
pub struct LinhaClienteAfetado {
    pub protocolo: String,
    pub regiao: String,
    pub data_inicial: chrono::DateTime<chrono::Utc>,
    pub data_prevista: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(flatten)]
    pub cliente: ClienteAfetado,
}

impl Default for PainelState {
    fn default() -> Self {
        Self::new(POR_PAGINA)
    }
}

impl PainelState {
    pub fn new(por_pagina: usize) -> Self {
        Self {
            membros: HashMap::new(),
            por_pagina,
        }
    }

    /// Mescla o snapshot de uma coleção. Documentos presentes são gravados por id;
    /// ids que vieram desta coleção e sumiram do snapshot perdem só a versão dela.
    /// Retorna quantos documentos inválidos foram ignorados.
    pub fn aplicar_snapshot(&mut self, snapshot: &Snapshot) -> usize {
        let mut invalidos = 0;
        let presentes: HashSet<&str> = snapshot.documentos.iter().map(|d| d.id.as_str()).collect();

        self.membros.retain(|id, versoes| {
            if !presentes.contains(id.as_str()) {
                versoes.remove(&snapshot.colecao);
            }
            !versoes.is_empty()
        });

        for doc in &snapshot.documentos {
            match decodificar::<Protocolo>(snapshot.colecao, &doc.id, doc.dados.clone()) {
                Ok(protocolo) => {
                    self.membros
                        .entry(doc.id.clone())
                        .or_default()
                        .insert(snapshot.colecao, protocolo);
                }
                Err(e) => {
                    tracing::warn!("⚠️ Ignorando documento no painel: {}", e);
                    invalidos += 1;
                }
            }
        }

        invalidos
    }

    /// Uma entrada por id: a versão mais recente; empate fica com a coleção mais adiante no fluxo
    fn entradas(&self) -> impl Iterator<Item = Entrada<'_>> {
        self.membros.values().filter_map(|versoes| {
            versoes
                .iter()
                .max_by(|a, b| {
                    a.1.atualizado_em
                        .cmp(&b.1.atualizado_em)
                        .then_with(|| a.0.cmp(b.0))
                })
                .map(|(colecao, protocolo)| Entrada { colecao: *colecao, protocolo })
        })
    }

    pub fn contagens(&self) -> Contagens {
        let mut c = Contagens::default();
        for entrada in self.entradas() {
            match entrada.colecao {
                Colecao::Analise => c.analise += 1,
                Colecao::Pendente => c.pendente += 1,
                Colecao::Ativos => {
                    c.ativos += 1;
                    c.clientes_afetados += entrada.protocolo.total_afetados;
                }
                Colecao::Reagendado => c.reagendado += 1,
                _ => {}
            }
        }
        c.total = self.membros.len();
        c
    }

    fn ordenados(&self) -> Vec<Entrada<'_>> {
        let mut entradas: Vec<Entrada<'_>> = self.entradas().collect();
        entradas.sort_by(|a, b| {
            b.protocolo
                .data_inicial
                .cmp(&a.protocolo.data_inicial)
                .then_with(|| a.protocolo.numero.cmp(&b.protocolo.numero))
        });
        entradas
    }

    pub fn consultar(&self, filtro: &FiltroPainel) -> Pagina<Protocolo> {
        let colecao = filtro.status.and_then(Colecao::de_status);
        let itens: Vec<Protocolo> = self
            .ordenados()
            .into_iter()
            .filter(|e| colecao.map(|c| e.colecao == c).unwrap_or(true))
            .filter(|e| {
                filtro
                    .busca
                    .as_deref()
                    .map(|termo| contem_normalizado(termo, &[&e.protocolo.numero, &e.protocolo.regiao]))
                    .unwrap_or(true)
            })
            .map(|e| e.protocolo.clone())
            .collect();

        Pagina::de(&itens, filtro.pagina.unwrap_or(1), self.por_pagina)
    }

    /// Um registro por cliente de cada protocolo ativo
    pub fn clientes_afetados(&self, busca: Option<&str>, pagina: usize) -> Pagina<LinhaClienteAfetado> {
        let linhas: Vec<LinhaClienteAfetado> = self
            .ordenados()
            .into_iter()
            .filter(|e| e.colecao == Colecao::Ativos)
            .flat_map(|e| {
                e.protocolo.clientes_afetados.iter().map(move |cliente| LinhaClienteAfetado {
                    protocolo: e.protocolo.numero.clone(),
                    regiao: e.protocolo.regiao.clone(),
                    data_inicial: e.protocolo.data_inicial,
                    data_prevista: e.protocolo.data_prevista,
                    cliente: cliente.clone(),
                })
            })
            .filter(|linha| {
                busca
                    .map(|termo| {
                        contem_normalizado(
                            termo,
                            &[&linha.protocolo, &linha.regiao, &linha.cliente.nome, &linha.cliente.codigo],
                        )
                    })
                    .unwrap_or(true)
            })
            .collect();

        Pagina::de(&linhas, pagina, self.por_pagina)
    }
}

/// Assina as coleções de status e mantém o painel atualizado
pub fn iniciar_assinaturas(store: Arc<dyn DocumentStore>, painel: Arc<RwLock<PainelState>>) -> Vec<JoinHandle<()>> {
    Colecao::STATUS
        .into_iter()
        .map(|colecao| {
            let store = store.clone();
            let painel = painel.clone();
            tokio::spawn(async move {
                // assina antes da carga inicial para não perder mudanças no meio
                let mut rx = store.subscribe(colecao);
                recarregar(store.as_ref(), &painel, colecao).await;

                loop {
                    match rx.recv().await {
                        Ok(snapshot) => {
                            painel.write().await.aplicar_snapshot(&snapshot);
                        }
                        Err(RecvError::Lagged(perdidos)) => {
                            tracing::warn!("⚠️ Painel perdeu {} snapshot(s) de {}; recarregando", perdidos, colecao);
                            recarregar(store.as_ref(), &painel, colecao).await;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        })
        .collect()
}

async fn recarregar(store: &dyn DocumentStore, painel: &RwLock<PainelState>, colecao: Colecao) {
    match store.list(colecao).await {
        Ok(documentos) => {
            let snapshot = Snapshot { colecao, documentos };
            painel.write().await.aplicar_snapshot(&snapshot);
        }
        Err(e) => tracing::error!("❌ Falha ao carregar {} no painel: {}", colecao, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::repositorio::documento;
    use crate::services::repositorio::fixtures::*;
    use crate::store::{Documento, Lote, MemoryStore};
    use serde_json::json;

    fn doc(p: &Protocolo) -> Documento {
        Documento { id: p.id.clone(), dados: documento(p).unwrap() }
    }

    fn snapshot(colecao: Colecao, protocolos: &[&Protocolo]) -> Snapshot {
        Snapshot { colecao, documentos: protocolos.iter().map(|p| doc(p)).collect() }
    }

    #[test]
    fn test_merge_dedup_and_counts() {
        let mut painel = PainelState::default();
        let mut a = protocolo("a", "100", StatusProtocolo::Analise);
        let b = protocolo("b", "200", StatusProtocolo::Ativos);

        painel.aplicar_snapshot(&snapshot(Colecao::Analise, &[&a]));
        let mut b_com_clientes = b.clone();
        b_com_clientes.total_afetados = 4;
        painel.aplicar_snapshot(&snapshot(Colecao::Ativos, &[&b_com_clientes]));
        assert_eq!(painel.contagens().analise, 1);
        assert_eq!(painel.contagens().clientes_afetados, 4);

        // "a" foi para Pendente: snapshot novo de Pendente chega antes do de Analise
        a.status = StatusProtocolo::Pendente;
        painel.aplicar_snapshot(&snapshot(Colecao::Pendente, &[&a]));
        painel.aplicar_snapshot(&snapshot(Colecao::Analise, &[]));

        let c = painel.contagens();
        assert_eq!((c.analise, c.pendente, c.ativos, c.total), (0, 1, 1, 2));
    }

    #[test]
    fn test_stale_snapshot_does_not_drop_live_ticket() {
        let mut painel = PainelState::default();
        let mut novo = protocolo("a", "100", StatusProtocolo::Pendente);
        novo.atualizado_em = data(11);
        let antigo = protocolo("a", "100", StatusProtocolo::Analise);

        painel.aplicar_snapshot(&snapshot(Colecao::Pendente, &[&novo]));
        // snapshot atrasado de Analise ainda com a versão anterior
        painel.aplicar_snapshot(&snapshot(Colecao::Analise, &[&antigo]));
        let c = painel.contagens();
        assert_eq!((c.analise, c.pendente, c.total), (0, 1, 1));

        painel.aplicar_snapshot(&snapshot(Colecao::Analise, &[]));
        let c = painel.contagens();
        assert_eq!((c.analise, c.pendente, c.total), (0, 1, 1));

        let pendentes = painel.consultar(&FiltroPainel {
            status: Some(StatusProtocolo::Pendente),
            ..Default::default()
        });
        assert_eq!(pendentes.itens[0].atualizado_em, data(11));
    }

    #[test]
    fn test_invalid_documents_are_skipped() {
        let mut painel = PainelState::default();
        let snap = Snapshot {
            colecao: Colecao::Analise,
            documentos: vec![Documento { id: "x".into(), dados: json!({"numero": 1}) }],
        };
        assert_eq!(painel.aplicar_snapshot(&snap), 1);
        assert_eq!(painel.contagens().total, 0);
    }

    #[test]
    fn test_filter_search_and_pagination() {
        let mut painel = PainelState::default();
        let mut protocolos = Vec::new();
        for i in 0..45 {
            let mut p = protocolo(&format!("id{}", i), &format!("{:05}", i), StatusProtocolo::Analise);
            p.regiao = if i % 3 == 0 { "São Carlos".into() } else { "Araraquara".into() };
            protocolos.push(p);
        }
        let refs: Vec<&Protocolo> = protocolos.iter().collect();
        painel.aplicar_snapshot(&snapshot(Colecao::Analise, &refs));

        let pagina = painel.consultar(&FiltroPainel { pagina: Some(3), ..Default::default() });
        assert_eq!(pagina.itens.len(), 5);
        assert_eq!(pagina.total_paginas, 3);
        assert_eq!(pagina.por_pagina, 20);

        let vazia = painel.consultar(&FiltroPainel { pagina: Some(4), ..Default::default() });
        assert!(vazia.itens.is_empty());

        let busca = painel.consultar(&FiltroPainel { busca: Some("sao carlos".into()), ..Default::default() });
        assert_eq!(busca.total_itens, 15);

        let por_numero = painel.consultar(&FiltroPainel { busca: Some("00042".into()), ..Default::default() });
        assert_eq!(por_numero.total_itens, 1);

        let pendentes = painel.consultar(&FiltroPainel {
            status: Some(StatusProtocolo::Pendente),
            ..Default::default()
        });
        assert_eq!(pendentes.total_itens, 0);
    }

    #[test]
    fn test_clientes_afetados_flattens_only_ativos() {
        let mut painel = PainelState::default();
        let mut ativo = protocolo("a", "1", StatusProtocolo::Ativos);
        ativo.clientes_afetados = vec![cliente("C1", None, None), cliente("C2", None, None)];
        let mut analise = protocolo("b", "2", StatusProtocolo::Analise);
        analise.clientes_afetados = vec![cliente("C3", None, None)];

        painel.aplicar_snapshot(&snapshot(Colecao::Ativos, &[&ativo]));
        painel.aplicar_snapshot(&snapshot(Colecao::Analise, &[&analise]));

        let linhas = painel.clientes_afetados(None, 1);
        assert_eq!(linhas.total_itens, 2);
        assert!(linhas.itens.iter().all(|l| l.protocolo == "1"));
        assert_eq!(painel.clientes_afetados(Some("c2"), 1).total_itens, 1);
    }

    #[tokio::test]
    async fn test_live_subscription_updates_state() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let painel = Arc::new(RwLock::new(PainelState::default()));
        let handles = iniciar_assinaturas(store.clone(), painel.clone());

        let p = protocolo("live", "555", StatusProtocolo::Reagendado);
        // espera as assinaturas ficarem ativas
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let mut lote = Lote::new();
        lote.set(Colecao::Reagendado, "live", documento(&p).unwrap());
        store.commit(lote).await.unwrap();

        let mut reagendados = 0;
        for _ in 0..50 {
            reagendados = painel.read().await.contagens().reagendado;
            if reagendados == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(reagendados, 1);

        for h in handles {
            h.abort();
        }
    }
}
