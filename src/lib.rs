// Biblioteca do backend de protocolos de manutenção
// Expõe módulos para uso em testes e no binário

pub mod config;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;
use tokio::sync::RwLock;

use mensageria::FilaEntrega;
use services::{
    CatalogoAtivos, FonteClientes, PainelState, RepositorioProtocolos, ServicoErrosContato,
    ServicoNotificacoes, ServicoRegistro, ServicoTemplates, ServicoTransicoes, ServicoUsuarios,
};
use store::DocumentStore;

// AppState é definido aqui para ser compartilhado
#[derive(Clone)]
pub struct AppState {
    pub settings: config::Settings,
    pub store: Arc<dyn DocumentStore>,
    pub repositorio: RepositorioProtocolos,
    pub transicoes: ServicoTransicoes,
    pub registro: ServicoRegistro,
    pub notificacoes: ServicoNotificacoes,
    pub templates: ServicoTemplates,
    pub usuarios: ServicoUsuarios,
    pub erros_contato: ServicoErrosContato,
    pub catalogo: Arc<CatalogoAtivos>,
    pub painel: Arc<RwLock<PainelState>>,
}

impl AppState {
    pub fn new(
        settings: config::Settings,
        store: Arc<dyn DocumentStore>,
        catalogo: Arc<CatalogoAtivos>,
        fonte: Arc<dyn FonteClientes>,
        fila: FilaEntrega,
    ) -> Self {
        let repositorio = RepositorioProtocolos::new(store.clone());
        let painel = Arc::new(RwLock::new(PainelState::new(settings.painel.por_pagina)));

        Self {
            transicoes: ServicoTransicoes::new(repositorio.clone()),
            registro: ServicoRegistro::new(repositorio.clone(), catalogo.clone(), fonte),
            notificacoes: ServicoNotificacoes::new(repositorio.clone(), catalogo.clone(), fila),
            templates: ServicoTemplates::new(store.clone()),
            usuarios: ServicoUsuarios::new(store.clone()),
            erros_contato: ServicoErrosContato::new(store.clone()),
            settings,
            store,
            repositorio,
            catalogo,
            painel,
        }
    }
}
