use chrono::{DateTime, Utc};
use mensageria::Canal;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::store::Colecao;
use crate::utils::{AppError, AppResult};

static VARIAVEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("regex de variável válida"));

/// Corpo de mensagem com variáveis `{{nome}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub nome: String,
    pub canal: Canal,
    #[serde(default)]
    pub assunto: Option<String>,
    pub corpo: String,
    #[serde(default = "Utc::now")]
    pub atualizado_em: DateTime<Utc>,
}

/// Arquivo YAML de templates padrão
#[derive(Debug, Deserialize)]
struct ArquivoTemplates {
    templates: Vec<Template>,
}

impl Template {
    /// Coleção onde templates do canal são guardados
    pub fn colecao(canal: Canal) -> Colecao {
        match canal {
            Canal::Whatsapp => Colecao::Messages,
            Canal::Email | Canal::EmailB2b => Colecao::Email,
        }
    }

    /// Substitui cada `{{chave}}` pelo valor numa única passada sobre o texto
    /// original; variáveis desconhecidas ficam como estão e valores inseridos
    /// nunca são reinterpretados
    pub fn substituir(texto: &str, variaveis: &HashMap<&str, String>) -> String {
        VARIAVEL_RE
            .replace_all(texto, |caps: &Captures| match variaveis.get(&caps[1]) {
                Some(valor) => valor.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Carrega os templates padrão do arquivo YAML
    pub fn carregar_padroes<P: AsRef<Path>>(path: P) -> AppResult<Vec<Self>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| AppError::ConfigError(format!("Failed to read templates file: {}", e)))?;

        let arquivo: ArquivoTemplates = serde_yaml::from_str(&contents)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse YAML templates: {}", e)))?;

        Ok(arquivo.templates)
    }
}
