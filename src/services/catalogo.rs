//! Catálogo estático: pontos de acesso, cidades e contatos B2B (arquivos JSON)

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::config::settings::AssetsSettings;
use crate::utils::normalization::normalizar;
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PontoAcesso {
    pub nome: String,
    pub cidade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cidade {
    pub nome: String,
    pub pontos_acesso: Vec<String>,
}

/// Emails adicionais de um cliente corporativo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContatoB2b {
    pub codigo: String,
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogoAtivos {
    pub pontos_acesso: Vec<PontoAcesso>,
    pub cidades: Vec<Cidade>,
    pub contatos: Vec<ContatoB2b>,
}

fn ler_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> AppResult<T> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .map_err(|e| AppError::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| AppError::ConfigError(format!("Failed to parse {}: {}", path.display(), e)))
}

impl CatalogoAtivos {
    pub fn carregar(assets: &AssetsSettings) -> AppResult<Self> {
        let catalogo = Self {
            pontos_acesso: ler_json(&assets.pontos_acesso)?,
            cidades: ler_json(&assets.cidades)?,
            contatos: ler_json(&assets.contatos)?,
        };
        tracing::info!(
            "📚 Catálogo carregado: {} pontos de acesso, {} cidades, {} contatos",
            catalogo.pontos_acesso.len(),
            catalogo.cidades.len(),
            catalogo.contatos.len()
        );
        Ok(catalogo)
    }

    pub fn cidade(&self, nome: &str) -> Option<&Cidade> {
        let alvo = normalizar(nome);
        self.cidades.iter().find(|c| normalizar(&c.nome) == alvo)
    }

    /// Pontos de acesso das cidades, sem repetição e na ordem de aparição
    pub fn expandir_cidades(&self, cidades: &[String]) -> AppResult<Vec<String>> {
        let mut vistos = HashSet::new();
        let mut pontos = Vec::new();
        for nome in cidades {
            let cidade = self
                .cidade(nome)
                .ok_or_else(|| AppError::ValidationError(format!("Cidade desconhecida: {}", nome)))?;
            for ponto in &cidade.pontos_acesso {
                if vistos.insert(ponto.clone()) {
                    pontos.push(ponto.clone());
                }
            }
        }
        Ok(pontos)
    }

    /// Com o catálogo vazio qualquer ponto é aceito
    pub fn ponto_conhecido(&self, nome: &str) -> bool {
        self.pontos_acesso.is_empty() || self.pontos_acesso.iter().any(|p| p.nome == nome)
    }

    pub fn emails_b2b(&self, codigo: &str) -> &[String] {
        self.contatos
            .iter()
            .find(|c| c.codigo == codigo)
            .map(|c| c.emails.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
pub(crate) fn catalogo_teste() -> CatalogoAtivos {
    CatalogoAtivos {
        pontos_acesso: vec![
            PontoAcesso { nome: "OLT-RP-01".into(), cidade: "Ribeirão Preto".into() },
            PontoAcesso { nome: "OLT-RP-02".into(), cidade: "Ribeirão Preto".into() },
            PontoAcesso { nome: "OLT-SC-01".into(), cidade: "São Carlos".into() },
        ],
        cidades: vec![
            Cidade { nome: "Ribeirão Preto".into(), pontos_acesso: vec!["OLT-RP-01".into(), "OLT-RP-02".into()] },
            Cidade { nome: "São Carlos".into(), pontos_acesso: vec!["OLT-SC-01".into()] },
        ],
        contatos: vec![ContatoB2b { codigo: "B2B-1".into(), emails: vec!["noc@corp.com".into()] }],
    }
}
