use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::normalization::somente_digitos;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("regex de email válida")
});

/// Etapa do ciclo de vida de um protocolo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusProtocolo {
    Analise,
    Pendente,
    Ativos,
    Reagendado,
    #[serde(rename = "Concluído")]
    Concluido,
    #[serde(rename = "Concluído com atraso")]
    ConcluidoComAtraso,
    Cancelado,
}

impl StatusProtocolo {
    pub fn concluido(&self) -> bool {
        matches!(self, StatusProtocolo::Concluido | StatusProtocolo::ConcluidoComAtraso)
    }

    pub fn nome(&self) -> &'static str {
        match self {
            StatusProtocolo::Analise => "Analise",
            StatusProtocolo::Pendente => "Pendente",
            StatusProtocolo::Ativos => "Ativos",
            StatusProtocolo::Reagendado => "Reagendado",
            StatusProtocolo::Concluido => "Concluído",
            StatusProtocolo::ConcluidoComAtraso => "Concluído com atraso",
            StatusProtocolo::Cancelado => "Cancelado",
        }
    }
}

impl fmt::Display for StatusProtocolo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nome())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TipoProtocolo {
    Programada,
    Emergencial,
    Melhoria,
}

impl TipoProtocolo {
    /// Tipos em que a previsão de término é obrigatória
    pub fn exige_previsao(&self) -> bool {
        !matches!(self, TipoProtocolo::Emergencial)
    }
}

/// Cliente impactado por uma manutenção
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClienteAfetado {
    pub nome: String,
    pub codigo: String,
    #[serde(default)]
    pub telefone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Sistema de origem (ex: "B2B", "ISP")
    #[serde(default)]
    pub origem: Option<String>,
    #[serde(default)]
    pub ponto_acesso: Option<String>,
    #[serde(default)]
    pub whatsapp_confirmado: bool,
    #[serde(default)]
    pub email_confirmado: bool,
}

impl ClienteAfetado {
    /// Telefone com DDD (ao menos 10 dígitos), apenas dígitos
    pub fn telefone_valido(&self) -> Option<String> {
        let digitos = somente_digitos(self.telefone.as_deref()?);
        (digitos.len() >= 10).then_some(digitos)
    }

    pub fn email_valido(&self) -> Option<&str> {
        let email = self.email.as_deref()?.trim();
        EMAIL_RE.is_match(email).then_some(email)
    }

    pub fn b2b(&self) -> bool {
        self.origem
            .as_deref()
            .map(|o| o.eq_ignore_ascii_case("b2b"))
            .unwrap_or(false)
    }
}

/// Janela de uma manutenção dividida em mais de um horário
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JanelaDividida {
    pub data_inicial: DateTime<Utc>,
    pub data_prevista: DateTime<Utc>,
    #[serde(default)]
    pub pontos_acesso: Vec<String>,
}

/// Documento de protocolo, igual em todas as coleções onde existe cópia
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocolo {
    pub id: String,
    pub numero: String,
    pub tipo: TipoProtocolo,
    pub status: StatusProtocolo,
    pub data_inicial: DateTime<Utc>,
    #[serde(default)]
    pub data_prevista: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data_final: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data_ativacao: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pontos_acesso: Vec<String>,
    #[serde(default)]
    pub cidades: Vec<String>,
    #[serde(default)]
    pub regiao: String,
    #[serde(default)]
    pub clientes_afetados: Vec<ClienteAfetado>,
    #[serde(default)]
    pub total_afetados: usize,
    #[serde(default)]
    pub email_enviado: bool,
    #[serde(default)]
    pub whatsapp_enviado: bool,
    #[serde(default)]
    pub comentarios: String,
    /// Código do motivo da última transição (ex: reagendamento)
    #[serde(default)]
    pub motivo: Option<String>,
    #[serde(default)]
    pub dividida: Vec<JanelaDividida>,
    /// Preenchido no espelho quando a exclusão foi iniciada
    #[serde(default)]
    pub status_exclusao: Option<String>,
    pub criado_em: DateTime<Utc>,
    pub atualizado_em: DateTime<Utc>,
}

impl Protocolo {
    /// Previsão estourada no momento `em`
    pub fn atrasado_em(&self, em: DateTime<Utc>) -> bool {
        self.data_prevista.map(|p| em > p).unwrap_or(false)
    }
}
