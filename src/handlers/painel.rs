use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use protocolos_manutencao::services::dashboard::{FiltroPainel, LinhaClienteAfetado, Pagina};
use protocolos_manutencao::AppState;

pub async fn painel(
    State(state): State<Arc<AppState>>,
    Query(filtro): Query<FiltroPainel>,
) -> Json<Value> {
    let painel = state.painel.read().await;
    Json(json!({
        "contagens": painel.contagens(),
        "protocolos": painel.consultar(&filtro),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct FiltroClientes {
    pub busca: Option<String>,
    pub pagina: Option<usize>,
}

pub async fn clientes_afetados(
    State(state): State<Arc<AppState>>,
    Query(filtro): Query<FiltroClientes>,
) -> Json<Pagina<LinhaClienteAfetado>> {
    let painel = state.painel.read().await;
    Json(painel.clientes_afetados(filtro.busca.as_deref(), filtro.pagina.unwrap_or(1)))
}
