use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::repositorio::decodificar;
use crate::models::{Papel, Usuario};
use crate::store::{Colecao, DocumentStore, Lote, StoreResult};
use crate::utils::logging::*;
use crate::utils::{AppError, AppResult};

/// Campos alteráveis pelo administrador
#[derive(Debug, Default, Deserialize)]
pub struct AtualizacaoUsuario {
    pub nome: Option<String>,
    pub papel: Option<Papel>,
    pub ativo: Option<bool>,
}

#[derive(Clone)]
pub struct ServicoUsuarios {
    store: Arc<dyn DocumentStore>,
}

impl ServicoUsuarios {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn buscar(&self, uid: &str) -> StoreResult<Option<Usuario>> {
        match self.store.get(Colecao::Users, uid).await? {
            Some(doc) => Ok(Some(decodificar(Colecao::Users, uid, doc)?)),
            None => Ok(None),
        }
    }

    pub async fn listar(&self) -> AppResult<Vec<Usuario>> {
        let mut usuarios: Vec<Usuario> = self
            .store
            .list(Colecao::Users)
            .await?
            .into_iter()
            .filter_map(|doc| match decodificar(Colecao::Users, &doc.id, doc.dados) {
                Ok(u) => Some(u),
                Err(e) => {
                    log_warning(&e.to_string());
                    None
                }
            })
            .collect();
        usuarios.sort_by(|a, b| a.nome.cmp(&b.nome));
        Ok(usuarios)
    }

    pub async fn atualizar(&self, uid: &str, atualizacao: AtualizacaoUsuario) -> AppResult<Usuario> {
        let mut usuario = self
            .buscar(uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Usuário {} não encontrado", uid)))?;

        let mut campos = Map::new();
        if let Some(nome) = atualizacao.nome {
            campos.insert("nome".into(), json!(nome));
            usuario.nome = nome;
        }
        if let Some(papel) = atualizacao.papel {
            campos.insert("papel".into(), json!(papel));
            usuario.papel = papel;
        }
        if let Some(ativo) = atualizacao.ativo {
            campos.insert("ativo".into(), json!(ativo));
            usuario.ativo = ativo;
        }
        if campos.is_empty() {
            return Ok(usuario);
        }

        let mut lote = Lote::new();
        lote.merge(Colecao::Users, uid, Value::Object(campos));
        self.store.commit(lote).await?;
        log_info(&format!("👤 Usuário {} atualizado ({:?}, ativo={})", uid, usuario.papel, usuario.ativo));
        Ok(usuario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn servico_com(usuarios: &[(&str, &str, Papel)]) -> ServicoUsuarios {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let mut lote = Lote::new();
        for (uid, nome, papel) in usuarios {
            lote.set(
                Colecao::Users,
                *uid,
                json!({"uid": uid, "nome": nome, "email": format!("{}@noc.com", uid), "papel": papel}),
            );
        }
        store.commit(lote).await.unwrap();
        ServicoUsuarios::new(store)
    }

    #[tokio::test]
    async fn test_listar_and_atualizar() {
        let servico = servico_com(&[("u2", "Zé", Papel::Leitor), ("u1", "Ana", Papel::Admin)]).await;
        let todos = servico.listar().await.unwrap();
        assert_eq!(todos[0].uid, "u1");
        assert!(todos[1].ativo);

        let atualizado = servico
            .atualizar("u2", AtualizacaoUsuario { papel: Some(Papel::Operador), ativo: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(atualizado.papel, Papel::Operador);

        let lido = servico.buscar("u2").await.unwrap().unwrap();
        assert_eq!(lido.nome, "Zé");
        assert!(!lido.ativo);
        assert!(matches!(
            servico.atualizar("u9", AtualizacaoUsuario::default()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
