use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub enriquecimento: EnriquecimentoSettings,
    pub notificacoes: NotificacoesSettings,
    pub assets: AssetsSettings,
    #[serde(default)]
    pub painel: PainelSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreSettings {
    /// "memory" ou "firestore"
    pub backend: String,
    pub project_id: Option<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_firestore_url")]
    pub base_url: String,
    pub token: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

/// API de dados de clientes (/dadosCliente, /pontosAcesso)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnriquecimentoSettings {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificacoesSettings {
    pub email_url: Option<String>,
    pub whatsapp_url: Option<String>,
    pub email_b2b_url: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_tentativas")]
    pub max_tentativas: u32,
    #[serde(default = "default_backoff")]
    pub backoff_inicial_ms: u64,
    #[serde(default = "default_capacidade")]
    pub capacidade_fila: usize,
    /// Por quanto tempo um despacho concluído continua consultável
    #[serde(default = "default_retencao")]
    pub retencao_segundos: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AssetsSettings {
    pub pontos_acesso: String,
    pub cidades: String,
    pub contatos: String,
    /// YAML com templates padrão, gravados se as coleções estiverem vazias
    pub templates: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PainelSettings {
    #[serde(default = "default_por_pagina")]
    pub por_pagina: usize,
}

impl Default for PainelSettings {
    fn default() -> Self {
        Self { por_pagina: default_por_pagina() }
    }
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_firestore_url() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_tentativas() -> u32 {
    3
}

fn default_backoff() -> u64 {
    100
}

fn default_capacidade() -> usize {
    256
}

fn default_retencao() -> u64 {
    3600
}

fn default_por_pagina() -> usize {
    20
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            // Arquivo de configuração base
            .add_source(File::with_name("config/default").required(false))
            // Arquivo específico do ambiente
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        // Segredos e endpoints vindos do ambiente (Cloud Run)
        if let Ok(token) = std::env::var("FIRESTORE_TOKEN") {
            builder = builder.set_override("store.token", token)?;
        }
        if let Ok(url) = std::env::var("ENRICHMENT_API_URL") {
            builder = builder.set_override("enriquecimento.base_url", url)?;
        }

        builder = builder.add_source(Environment::with_prefix("PROTOCOLOS").separator("__"));

        let s = builder.build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults_applied() {
        let toml = r#"
[server]
host = "0.0.0.0"
port = 8080

[store]
backend = "memory"

[enriquecimento]
base_url = "http://localhost:9000"

[notificacoes]
timeout_seconds = 10

[assets]
pontos_acesso = "assets/pontos_acesso.json"
cidades = "assets/cidades.json"
contatos = "assets/contatos.json"
"#;
        let settings: Settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.painel.por_pagina, 20);
        assert_eq!(settings.notificacoes.max_tentativas, 3);
        assert_eq!(settings.store.database, "(default)");
        assert!(settings.notificacoes.whatsapp_url.is_none());
    }
}
