use chrono::{DateTime, Utc};
use mensageria::Canal;
use serde::{Deserialize, Serialize};

/// Contato que não recebeu a notificação após todas as tentativas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErroContato {
    pub id: String,
    pub protocolo: String,
    pub codigo_cliente: String,
    pub nome_cliente: String,
    pub canal: Canal,
    pub destino: String,
    pub erro: String,
    pub tentativas: u32,
    pub registrado_em: DateTime<Utc>,
}

/// Registro de consulta à API de dados de clientes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requisicao {
    pub id: String,
    pub protocolo: String,
    pub pontos_acesso: Vec<String>,
    pub cidades: Vec<String>,
    pub clientes_encontrados: usize,
    pub realizada_em: DateTime<Utc>,
}
