//! Contatos que não receberam aviso, para correção manual do cadastro

use std::sync::Arc;

use super::repositorio::decodificar;
use crate::models::ErroContato;
use crate::store::{Colecao, DocumentStore, Lote};
use crate::utils::logging::*;
use crate::utils::{AppError, AppResult};

#[derive(Clone)]
pub struct ServicoErrosContato {
    store: Arc<dyn DocumentStore>,
}

impl ServicoErrosContato {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Mais recentes primeiro, opcionalmente de um protocolo
    pub async fn listar(&self, protocolo: Option<&str>) -> AppResult<Vec<ErroContato>> {
        let mut erros: Vec<ErroContato> = Vec::new();
        for doc in self.store.list(Colecao::ErrorContatos).await? {
            match decodificar::<ErroContato>(Colecao::ErrorContatos, &doc.id, doc.dados) {
                Ok(erro) if protocolo.map_or(true, |p| erro.protocolo == p) => erros.push(erro),
                Ok(_) => {}
                Err(e) => log_warning(&e.to_string()),
            }
        }
        erros.sort_by(|a, b| b.registrado_em.cmp(&a.registrado_em));
        Ok(erros)
    }

    pub async fn remover(&self, id: &str) -> AppResult<()> {
        if !self.store.exists(Colecao::ErrorContatos, id).await? {
            return Err(AppError::NotFound(format!("Erro de contato {} não encontrado", id)));
        }
        let mut lote = Lote::new();
        lote.delete(Colecao::ErrorContatos, id);
        self.store.commit(lote).await?;
        Ok(())
    }
}
