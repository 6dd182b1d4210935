//! Disparo de avisos de manutenção
//!
//! O disparo monta um destinatário por cliente afetado com contato válido no
//! canal, renderiza o template e entrega o lote à fila da `mensageria`,
//! retornando o id do despacho sem esperar os envios. Quando o worker termina,
//! [`registrar_resultado`] grava as confirmações e os contatos que falharam.

use chrono::{DateTime, Utc};
use mensageria::{Canal, Despacho, EntregaError, EstadoDespacho, FilaEntrega, Mensagem, StatusEntrega};
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use super::catalogo::CatalogoAtivos;
use super::repositorio::{decodificar, RepositorioProtocolos};
use crate::models::{ErroContato, Protocolo, Template};
use crate::store::{Colecao, Lote, StoreError};
use crate::utils::logging::*;

#[derive(Debug, Error)]
pub enum NotificacaoError {
    #[error("{0} não encontrado")]
    NaoEncontrado(String),

    #[error("Nenhum destinatário válido para o protocolo {0}")]
    SemDestinatarios(String),

    #[error("Template {template} não é do canal {canal}")]
    CanalIncompativel { template: String, canal: Canal },

    #[error("Falha na fila de entrega: {0}")]
    Fila(#[from] EntregaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type NotificacaoResult<T> = Result<T, NotificacaoError>;

/// Resposta imediata de um disparo
#[derive(Debug, Clone, Serialize)]
pub struct Disparo {
    pub id: String,
    pub canal: Canal,
    pub protocolo: String,
    pub destinatarios: usize,
}

const FORMATO_DATA: &str = "%d/%m/%Y %H:%M";

fn formatar(data: DateTime<Utc>) -> String {
    data.format(FORMATO_DATA).to_string()
}

fn janela(protocolo: &Protocolo) -> String {
    let intervalo = |inicio: DateTime<Utc>, fim: Option<DateTime<Utc>>| match fim {
        Some(fim) => format!("{} às {}", formatar(inicio), formatar(fim)),
        None => format!("a partir de {}", formatar(inicio)),
    };

    if protocolo.dividida.is_empty() {
        intervalo(protocolo.data_inicial, protocolo.data_prevista)
    } else {
        protocolo
            .dividida
            .iter()
            .map(|j| intervalo(j.data_inicial, Some(j.data_prevista)))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn variaveis<'a>(protocolo: &Protocolo, nome: &str) -> HashMap<&'a str, String> {
    HashMap::from([
        ("nome", nome.to_string()),
        ("protocolo", protocolo.numero.clone()),
        ("data_inicial", formatar(protocolo.data_inicial)),
        ("data_prevista", protocolo.data_prevista.map(formatar).unwrap_or_default()),
        ("janela", janela(protocolo)),
        ("regiao", protocolo.regiao.clone()),
        ("pontos_acesso", protocolo.pontos_acesso.join(", ")),
    ])
}

/// Uma mensagem por contato válido no canal; clientes B2B recebem apenas pelo canal B2B
pub fn montar_destinatarios(
    protocolo: &Protocolo,
    canal: Canal,
    template: &Template,
    catalogo: &CatalogoAtivos,
) -> Vec<Mensagem> {
    let mut mensagens = Vec::new();
    let mut vistos = HashSet::new();

    for cliente in &protocolo.clientes_afetados {
        let destinos: Vec<String> = match canal {
            Canal::Whatsapp => cliente.telefone_valido().into_iter().collect(),
            Canal::Email if !cliente.b2b() => cliente.email_valido().map(String::from).into_iter().collect(),
            Canal::EmailB2b if cliente.b2b() => match cliente.email_valido() {
                Some(email) => std::iter::once(email.to_string())
                    .chain(catalogo.emails_b2b(&cliente.codigo).iter().cloned())
                    .collect(),
                None => Vec::new(),
            },
            _ => Vec::new(),
        };

        if destinos.is_empty() {
            continue;
        }

        let vars = variaveis(protocolo, &cliente.nome);
        let corpo = Template::substituir(&template.corpo, &vars);
        let assunto = template.assunto.as_deref().map(|a| Template::substituir(a, &vars));

        for destino in destinos {
            if !vistos.insert(destino.clone()) {
                continue;
            }
            mensagens.push(Mensagem {
                destino,
                nome: cliente.nome.clone(),
                codigo: cliente.codigo.clone(),
                referencia: protocolo.numero.clone(),
                assunto: assunto.clone(),
                corpo: corpo.clone(),
            });
        }
    }

    mensagens
}

/// Protocolo ativo na coleção de status ou, se concluído, na auditoria
async fn carregar_protocolo(
    repo: &RepositorioProtocolos,
    id: &str,
) -> Result<Option<(Option<Colecao>, Protocolo)>, StoreError> {
    if let Some((colecao, protocolo)) = repo.localizar(id).await? {
        return Ok(Some((Some(colecao), protocolo)));
    }
    Ok(repo.buscar(Colecao::Manutencao, id).await?.map(|p| (None, p)))
}

#[derive(Clone)]
pub struct ServicoNotificacoes {
    repo: RepositorioProtocolos,
    catalogo: Arc<CatalogoAtivos>,
    fila: FilaEntrega,
}

impl ServicoNotificacoes {
    pub fn new(repo: RepositorioProtocolos, catalogo: Arc<CatalogoAtivos>, fila: FilaEntrega) -> Self {
        Self { repo, catalogo, fila }
    }

    async fn template(&self, canal: Canal, id: &str) -> NotificacaoResult<Template> {
        let colecao = Template::colecao(canal);
        let doc = self
            .repo
            .store()
            .get(colecao, id)
            .await?
            .ok_or_else(|| NotificacaoError::NaoEncontrado(format!("Template {}", id)))?;
        let template: Template = decodificar(colecao, id, doc)?;

        if template.canal != canal {
            return Err(NotificacaoError::CanalIncompativel { template: template.id, canal });
        }
        Ok(template)
    }

    pub async fn disparar(&self, id_protocolo: &str, canal: Canal, id_template: &str) -> NotificacaoResult<Disparo> {
        let (_, protocolo) = carregar_protocolo(&self.repo, id_protocolo)
            .await?
            .ok_or_else(|| NotificacaoError::NaoEncontrado(format!("Protocolo {}", id_protocolo)))?;
        let template = self.template(canal, id_template).await?;

        let mensagens = montar_destinatarios(&protocolo, canal, &template, &self.catalogo);
        if mensagens.is_empty() {
            log_warning(&format!(
                "Protocolo {} sem destinatários válidos para {}",
                protocolo.numero, canal
            ));
            return Err(NotificacaoError::SemDestinatarios(protocolo.numero));
        }

        let total = mensagens.len();
        let id = self
            .fila
            .enfileirar(Despacho::new(canal, protocolo.id.clone(), mensagens))
            .await?;

        log_info(&format!(
            "📣 Disparo {} ({}) para protocolo {}: {} destinatário(s)",
            id, canal, protocolo.numero, total
        ));

        Ok(Disparo { id, canal, protocolo: protocolo.numero, destinatarios: total })
    }

    pub async fn status(&self, id_despacho: &str) -> Option<EstadoDespacho> {
        self.fila.status(id_despacho).await
    }
}

/// Releituras quando o protocolo muda de coleção entre a leitura e o commit
const TENTATIVAS_RESULTADO: usize = 3;

/// Grava o resultado de um despacho concluído
///
/// Flags do protocolo e confirmações por cliente são mescladas na coleção de
/// status, no espelho e na auditoria; cada destinatário que falhou vira um
/// documento em `ErrorContatos`. Tudo num único lote. O merge na coleção de
/// status só vale se o documento ainda estiver lá; se uma transição o moveu,
/// o protocolo é relido e o lote refeito.
pub async fn registrar_resultado(
    repo: &RepositorioProtocolos,
    estado: &EstadoDespacho,
    em: DateTime<Utc>,
) -> Result<(), StoreError> {
    let mut tentativa = 1;
    loop {
        let Some(resultado) = lote_resultado(repo, estado, em).await? else {
            log_warning(&format!(
                "Despacho {} concluído para protocolo inexistente {}",
                estado.id, estado.referencia
            ));
            return Ok(());
        };

        match repo.commit(resultado.lote).await {
            Ok(()) => {
                log_info(&format!(
                    "📝 Resultado do despacho {} gravado: {} confirmado(s), {} falha(s)",
                    estado.id, resultado.confirmados, resultado.falhas
                ));
                return Ok(());
            }
            Err(StoreError::Conflito(motivo)) if tentativa < TENTATIVAS_RESULTADO => {
                log_warning(&format!(
                    "Protocolo {} mudou antes de gravar o despacho {}: {}",
                    estado.referencia, estado.id, motivo
                ));
                tentativa += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

struct LoteResultado {
    lote: Lote,
    confirmados: usize,
    falhas: usize,
}

async fn lote_resultado(
    repo: &RepositorioProtocolos,
    estado: &EstadoDespacho,
    em: DateTime<Utc>,
) -> Result<Option<LoteResultado>, StoreError> {
    let Some((colecao, mut protocolo)) = carregar_protocolo(repo, &estado.referencia).await? else {
        return Ok(None);
    };

    let confirmados: HashSet<&str> = estado
        .destinatarios
        .iter()
        .filter(|d| d.status == StatusEntrega::Enviado)
        .map(|d| d.codigo.as_str())
        .collect();

    for cliente in protocolo
        .clientes_afetados
        .iter_mut()
        .filter(|c| confirmados.contains(c.codigo.as_str()))
    {
        match estado.canal {
            Canal::Whatsapp => cliente.whatsapp_confirmado = true,
            Canal::Email | Canal::EmailB2b => cliente.email_confirmado = true,
        }
    }

    let flag = match estado.canal {
        Canal::Whatsapp => "whatsapp_enviado",
        Canal::Email | Canal::EmailB2b => "email_enviado",
    };
    let mut campos = json!({
        "clientes_afetados": serde_json::to_value(&protocolo.clientes_afetados)?,
        "atualizado_em": em,
    });
    if !confirmados.is_empty() {
        campos[flag] = json!(true);
    }

    let mut lote = Lote::new();
    if let Some(colecao) = colecao {
        lote.atualizar(colecao, protocolo.id.clone(), campos.clone());
    }
    lote.merge(Colecao::Protocolos, protocolo.numero.clone(), campos.clone())
        .merge(Colecao::Manutencao, protocolo.id.clone(), campos);

    let mut falhas = 0;
    for falha in estado.falhas() {
        let erro = ErroContato {
            id: uuid::Uuid::new_v4().to_string(),
            protocolo: protocolo.numero.clone(),
            codigo_cliente: falha.codigo.clone(),
            nome_cliente: falha.nome.clone(),
            canal: estado.canal,
            destino: falha.destino.clone(),
            erro: falha.erro.clone().unwrap_or_default(),
            tentativas: falha.tentativas,
            registrado_em: em,
        };
        lote.set(Colecao::ErrorContatos, erro.id.clone(), serde_json::to_value(&erro)?);
        falhas += 1;
    }

    Ok(Some(LoteResultado { lote, confirmados: confirmados.len(), falhas }))
}
