//! Cadastro de novos protocolos
//!
//! Valida o formulário, resolve os clientes afetados pela API de dados de
//! clientes e grava o mesmo documento em `Analise`, `manutencao` e
//! `protocolos` num único lote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use super::catalogo::CatalogoAtivos;
use super::dados_cliente::{ClienteApi, FonteClientes};
use super::repositorio::{documento, RepositorioProtocolos};
use crate::models::{ClienteAfetado, JanelaDividida, Protocolo, Requisicao, StatusProtocolo, TipoProtocolo};
use crate::store::{Colecao, Lote, StoreError};
use crate::utils::logging::*;

#[derive(Debug, Error)]
pub enum RegistroError {
    #[error("{0}")]
    Validacao(String),

    #[error("Protocolo {0} já existe")]
    ProtocoloDuplicado(String),

    #[error("Falha ao consultar clientes afetados: {0}")]
    Enriquecimento(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type RegistroResult<T> = Result<T, RegistroError>;

/// Dados do formulário de cadastro
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NovoProtocolo {
    pub numero: String,
    pub tipo: TipoProtocolo,
    pub data_inicial: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data_prevista: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pontos_acesso: Vec<String>,
    #[serde(default)]
    pub cidades: Vec<String>,
    /// Adiciona os pontos de acesso das cidades selecionadas
    #[serde(default)]
    pub expandir_cidades: bool,
    /// Consulta clientes por cidade em vez de por ponto de acesso
    #[serde(default)]
    pub modo_cidade: bool,
    #[serde(default)]
    pub regiao: String,
    #[serde(default)]
    pub comentarios: String,
    #[serde(default)]
    pub dividida: Vec<JanelaDividida>,
}

#[derive(Debug)]
struct Validado {
    data_inicial: DateTime<Utc>,
    pontos_acesso: Vec<String>,
}

#[derive(Clone)]
pub struct ServicoRegistro {
    repo: RepositorioProtocolos,
    catalogo: Arc<CatalogoAtivos>,
    fonte: Arc<dyn FonteClientes>,
}

fn invalido(campo: &str, mensagem: &str) -> RegistroError {
    log_validation_error(campo, mensagem);
    RegistroError::Validacao(mensagem.to_string())
}

impl ServicoRegistro {
    pub fn new(repo: RepositorioProtocolos, catalogo: Arc<CatalogoAtivos>, fonte: Arc<dyn FonteClientes>) -> Self {
        Self { repo, catalogo, fonte }
    }

    fn validar(&self, novo: &NovoProtocolo) -> RegistroResult<Validado> {
        let numero = novo.numero.trim();
        if numero.is_empty() {
            return Err(invalido("numero", "Número do protocolo é obrigatório"));
        }
        if !numero.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
            return Err(invalido("numero", "Número do protocolo contém caracteres inválidos"));
        }

        let data_inicial = novo
            .data_inicial
            .ok_or_else(|| invalido("data_inicial", "Data inicial é obrigatória"))?;

        match novo.data_prevista {
            Some(prevista) if prevista <= data_inicial => {
                return Err(invalido("data_prevista", "Data prevista deve ser posterior à data inicial"));
            }
            None if novo.tipo.exige_previsao() => {
                return Err(invalido("data_prevista", "Data prevista é obrigatória para este tipo"));
            }
            _ => {}
        }

        for janela in &novo.dividida {
            if janela.data_prevista <= janela.data_inicial {
                return Err(invalido("dividida", "Cada janela dividida deve terminar após o início"));
            }
        }

        let mut pontos: Vec<String> = novo
            .pontos_acesso
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if novo.expandir_cidades || novo.modo_cidade {
            let expandidos = self
                .catalogo
                .expandir_cidades(&novo.cidades)
                .map_err(|e| invalido("cidades", &e.to_string()))?;
            pontos.extend(expandidos);
        }
        let mut vistos = HashSet::new();
        pontos.retain(|p| vistos.insert(p.clone()));

        if pontos.is_empty() {
            return Err(invalido("pontos_acesso", "Informe ao menos um ponto de acesso"));
        }
        if let Some(desconhecido) = pontos.iter().find(|p| !self.catalogo.ponto_conhecido(p)) {
            return Err(invalido(
                "pontos_acesso",
                &format!("Ponto de acesso desconhecido: {}", desconhecido),
            ));
        }

        Ok(Validado { data_inicial, pontos_acesso: pontos })
    }

    /// Clientes não cancelados, sem repetição de código
    async fn buscar_clientes(&self, novo: &NovoProtocolo, pontos: &[String]) -> RegistroResult<Vec<ClienteAfetado>> {
        let mut brutos: Vec<ClienteApi> = Vec::new();
        let consultas: &[String] = if novo.modo_cidade { &novo.cidades } else { pontos };

        for alvo in consultas {
            let resultado = if novo.modo_cidade {
                self.fonte.clientes_por_cidade(alvo).await
            } else {
                self.fonte.clientes_por_ponto(alvo).await
            };
            let mut clientes = resultado.map_err(|e| RegistroError::Enriquecimento(e.to_string()))?;
            if !novo.modo_cidade {
                for c in clientes.iter_mut().filter(|c| c.ponto_acesso.is_none()) {
                    c.ponto_acesso = Some(alvo.clone());
                }
            }
            brutos.extend(clientes);
        }

        let mut vistos = HashSet::new();
        Ok(brutos
            .into_iter()
            .filter(|c| !c.cancelado)
            .filter(|c| vistos.insert(c.codigo.clone()))
            .map(ClienteAfetado::from)
            .collect())
    }

    fn regiao(&self, novo: &NovoProtocolo, pontos: &[String]) -> String {
        if !novo.regiao.trim().is_empty() {
            return novo.regiao.trim().to_string();
        }
        if !novo.cidades.is_empty() {
            return novo.cidades.join(", ");
        }
        pontos
            .first()
            .and_then(|p| self.catalogo.pontos_acesso.iter().find(|pa| &pa.nome == p))
            .map(|pa| pa.cidade.clone())
            .unwrap_or_default()
    }

    pub async fn registrar(&self, novo: NovoProtocolo, em: DateTime<Utc>) -> RegistroResult<Protocolo> {
        let validado = self.validar(&novo)?;
        let numero = novo.numero.trim().to_string();

        if self.repo.numero_existe(&numero).await? {
            log_validation_error("numero", &format!("Protocolo {} duplicado", numero));
            return Err(RegistroError::ProtocoloDuplicado(numero));
        }

        let clientes = self.buscar_clientes(&novo, &validado.pontos_acesso).await?;
        let regiao = self.regiao(&novo, &validado.pontos_acesso);

        let protocolo = Protocolo {
            id: uuid::Uuid::new_v4().to_string(),
            numero: numero.clone(),
            tipo: novo.tipo,
            status: StatusProtocolo::Analise,
            data_inicial: validado.data_inicial,
            data_prevista: novo.data_prevista,
            data_final: None,
            data_ativacao: None,
            pontos_acesso: validado.pontos_acesso.clone(),
            cidades: novo.cidades.clone(),
            regiao,
            total_afetados: clientes.len(),
            clientes_afetados: clientes,
            email_enviado: false,
            whatsapp_enviado: false,
            comentarios: novo.comentarios,
            motivo: None,
            dividida: novo.dividida,
            status_exclusao: None,
            criado_em: em,
            atualizado_em: em,
        };

        let requisicao = Requisicao {
            id: uuid::Uuid::new_v4().to_string(),
            protocolo: numero.clone(),
            pontos_acesso: validado.pontos_acesso,
            cidades: novo.cidades,
            clientes_encontrados: protocolo.total_afetados,
            realizada_em: em,
        };

        let doc = documento(&protocolo)?;
        let mut lote = Lote::new();
        // o espelho só é criado se o número ainda estiver livre no momento do commit
        lote.set(Colecao::Analise, protocolo.id.clone(), doc.clone())
            .set(Colecao::Manutencao, protocolo.id.clone(), doc.clone())
            .criar(Colecao::Protocolos, numero.clone(), doc)
            .set(Colecao::Requisicao, requisicao.id.clone(), serde_json::to_value(&requisicao).map_err(StoreError::from)?);
        match self.repo.commit(lote).await {
            Ok(()) => {}
            Err(StoreError::Conflito(_)) => {
                log_validation_error("numero", &format!("Protocolo {} duplicado", numero));
                return Err(RegistroError::ProtocoloDuplicado(numero));
            }
            Err(e) => return Err(e.into()),
        }

        log_protocolo_registrado(&numero, protocolo.total_afetados);
        Ok(protocolo)
    }
}
