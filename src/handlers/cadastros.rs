// Rotas administrativas: templates, usuários, erros de contato e relatórios

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use mensageria::Canal;
use serde::Deserialize;
use std::sync::Arc;

use protocolos_manutencao::models::{ErroContato, Template, Usuario};
use protocolos_manutencao::services::relatorios::{self, FiltroRelatorio, RelatorioProtocolos};
use protocolos_manutencao::services::usuarios::AtualizacaoUsuario;
use protocolos_manutencao::utils::AppResult;
use protocolos_manutencao::AppState;

#[derive(Debug, Deserialize)]
pub struct DadosTemplate {
    pub nome: String,
    #[serde(default)]
    pub assunto: Option<String>,
    pub corpo: String,
}

impl DadosTemplate {
    fn em_template(self, id: String, canal: Canal) -> Template {
        Template {
            id,
            nome: self.nome,
            canal,
            assunto: self.assunto,
            corpo: self.corpo,
            atualizado_em: Utc::now(),
        }
    }
}

pub async fn listar_templates(
    State(state): State<Arc<AppState>>,
    Path(canal): Path<Canal>,
) -> AppResult<Json<Vec<Template>>> {
    Ok(Json(state.templates.listar(canal).await?))
}

pub async fn criar_template(
    State(state): State<Arc<AppState>>,
    Path(canal): Path<Canal>,
    Json(dados): Json<DadosTemplate>,
) -> AppResult<(StatusCode, Json<Template>)> {
    let template = dados.em_template(String::new(), canal);
    let salvo = state.templates.salvar(canal, template, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(salvo)))
}

pub async fn atualizar_template(
    State(state): State<Arc<AppState>>,
    Path((canal, id)): Path<(Canal, String)>,
    Json(dados): Json<DadosTemplate>,
) -> AppResult<Json<Template>> {
    state.templates.buscar(canal, &id).await?;
    let template = dados.em_template(id, canal);
    Ok(Json(state.templates.salvar(canal, template, Utc::now()).await?))
}

pub async fn remover_template(
    State(state): State<Arc<AppState>>,
    Path((canal, id)): Path<(Canal, String)>,
) -> AppResult<StatusCode> {
    state.templates.remover(canal, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn listar_usuarios(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Usuario>>> {
    Ok(Json(state.usuarios.listar().await?))
}

pub async fn atualizar_usuario(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    Json(atualizacao): Json<AtualizacaoUsuario>,
) -> AppResult<Json<Usuario>> {
    Ok(Json(state.usuarios.atualizar(&uid, atualizacao).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct FiltroErros {
    pub protocolo: Option<String>,
}

pub async fn listar_erros_contato(
    State(state): State<Arc<AppState>>,
    Query(filtro): Query<FiltroErros>,
) -> AppResult<Json<Vec<ErroContato>>> {
    Ok(Json(state.erros_contato.listar(filtro.protocolo.as_deref()).await?))
}

pub async fn remover_erro_contato(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.erros_contato.remover(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn relatorio_protocolos(
    State(state): State<Arc<AppState>>,
    Query(filtro): Query<FiltroRelatorio>,
) -> AppResult<Json<RelatorioProtocolos>> {
    Ok(Json(relatorios::gerar(&state.repositorio, &filtro).await?))
}
