//! Relatório de protocolos por período, a partir do espelho `protocolos`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::repositorio::{decodificar, RepositorioProtocolos};
use crate::models::{Protocolo, StatusProtocolo};
use crate::store::Colecao;
use crate::utils::logging::*;
use crate::utils::normalization::contem_normalizado;
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FiltroRelatorio {
    pub inicio: Option<DateTime<Utc>>,
    pub fim: Option<DateTime<Utc>>,
    pub regiao: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatorioProtocolos {
    pub total: usize,
    pub por_status: BTreeMap<String, usize>,
    pub por_regiao: BTreeMap<String, usize>,
    pub total_afetados: usize,
    pub concluidos_com_atraso: usize,
    pub protocolos: Vec<Protocolo>,
}

pub async fn gerar(repo: &RepositorioProtocolos, filtro: &FiltroRelatorio) -> AppResult<RelatorioProtocolos> {
    if let (Some(inicio), Some(fim)) = (filtro.inicio, filtro.fim) {
        if fim < inicio {
            return Err(AppError::ValidationError("Fim do período anterior ao início".to_string()));
        }
    }

    let mut protocolos: Vec<Protocolo> = Vec::new();
    for doc in repo.store().list(Colecao::Protocolos).await? {
        let protocolo: Protocolo = match decodificar(Colecao::Protocolos, &doc.id, doc.dados) {
            Ok(p) => p,
            Err(e) => {
                log_warning(&e.to_string());
                continue;
            }
        };
        // exclusão em andamento
        if protocolo.status_exclusao.is_some() {
            continue;
        }
        if filtro.inicio.map_or(false, |i| protocolo.data_inicial < i)
            || filtro.fim.map_or(false, |f| protocolo.data_inicial > f)
        {
            continue;
        }
        if let Some(regiao) = &filtro.regiao {
            if !contem_normalizado(regiao, &[&protocolo.regiao]) {
                continue;
            }
        }
        protocolos.push(protocolo);
    }
    protocolos.sort_by(|a, b| a.data_inicial.cmp(&b.data_inicial));

    let mut por_status = BTreeMap::new();
    let mut por_regiao = BTreeMap::new();
    for p in &protocolos {
        *por_status.entry(p.status.to_string()).or_insert(0) += 1;
        *por_regiao.entry(p.regiao.clone()).or_insert(0) += 1;
    }

    Ok(RelatorioProtocolos {
        total: protocolos.len(),
        por_status,
        por_regiao,
        total_afetados: protocolos.iter().map(|p| p.total_afetados).sum(),
        concluidos_com_atraso: protocolos
            .iter()
            .filter(|p| p.status == StatusProtocolo::ConcluidoComAtraso)
            .count(),
        protocolos,
    })
}
