use chrono::{DateTime, Utc};
use mensageria::Canal;
use std::sync::Arc;

use super::repositorio::decodificar;
use crate::models::Template;
use crate::store::{DocumentStore, Lote};
use crate::utils::logging::*;
use crate::utils::{AppError, AppResult};

/// Cadastro de templates de mensagem por canal
#[derive(Clone)]
pub struct ServicoTemplates {
    store: Arc<dyn DocumentStore>,
}

impl ServicoTemplates {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn listar(&self, canal: Canal) -> AppResult<Vec<Template>> {
        let colecao = Template::colecao(canal);
        let mut templates = Vec::new();
        for doc in self.store.list(colecao).await? {
            match decodificar::<Template>(colecao, &doc.id, doc.dados) {
                Ok(t) if t.canal == canal => templates.push(t),
                Ok(_) => {}
                Err(e) => log_warning(&e.to_string()),
            }
        }
        templates.sort_by(|a, b| a.nome.cmp(&b.nome));
        Ok(templates)
    }

    pub async fn buscar(&self, canal: Canal, id: &str) -> AppResult<Template> {
        let colecao = Template::colecao(canal);
        let doc = self
            .store
            .get(colecao, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Template {} não encontrado", id)))?;
        let template: Template = decodificar(colecao, id, doc)?;
        if template.canal != canal {
            return Err(AppError::NotFound(format!("Template {} não encontrado em {}", id, canal)));
        }
        Ok(template)
    }

    /// Cria ou substitui; sem id, um novo é gerado
    pub async fn salvar(&self, canal: Canal, mut template: Template, em: DateTime<Utc>) -> AppResult<Template> {
        if template.nome.trim().is_empty() {
            return Err(AppError::ValidationError("Nome do template é obrigatório".to_string()));
        }
        if template.corpo.trim().is_empty() {
            return Err(AppError::ValidationError("Corpo do template é obrigatório".to_string()));
        }
        if template.id.trim().is_empty() {
            template.id = uuid::Uuid::new_v4().to_string();
        }
        template.canal = canal;
        template.atualizado_em = em;

        let mut lote = Lote::new();
        lote.set(Template::colecao(canal), template.id.clone(), serde_json::to_value(&template)?);
        self.store.commit(lote).await?;

        log_info(&format!("✏️ Template {} ({}) salvo", template.id, canal));
        Ok(template)
    }

    pub async fn remover(&self, canal: Canal, id: &str) -> AppResult<()> {
        self.buscar(canal, id).await?;
        let mut lote = Lote::new();
        lote.delete(Template::colecao(canal), id);
        self.store.commit(lote).await?;
        log_info(&format!("🗑️ Template {} ({}) removido", id, canal));
        Ok(())
    }

    /// Grava os templates padrão que ainda não existem; retorna quantos foram criados
    pub async fn semear_padroes(&self, padroes: &[Template]) -> AppResult<usize> {
        let mut lote = Lote::new();
        for template in padroes {
            let colecao = Template::colecao(template.canal);
            if !self.store.exists(colecao, &template.id).await? {
                lote.set(colecao, template.id.clone(), serde_json::to_value(template)?);
            }
        }
        let criados = lote.len();
        if !lote.is_empty() {
            self.store.commit(lote).await?;
        }
        Ok(criados)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::repositorio::fixtures::data;
    use crate::store::MemoryStore;

    fn template(id: &str, nome: &str, canal: Canal) -> Template {
        Template {
            id: id.into(),
            nome: nome.into(),
            canal,
            assunto: None,
            corpo: "Olá {{nome}}".into(),
            atualizado_em: data(0),
        }
    }

    #[tokio::test]
    async fn test_crud_keeps_channels_apart() {
        let servico = ServicoTemplates::new(Arc::new(MemoryStore::new()));
        servico.salvar(Canal::Email, template("", "Zeta", Canal::Email), data(1)).await.unwrap();
        servico.salvar(Canal::Email, template("a", "Alfa", Canal::Email), data(1)).await.unwrap();
        servico.salvar(Canal::EmailB2b, template("b", "B2B", Canal::EmailB2b), data(1)).await.unwrap();

        let emails = servico.listar(Canal::Email).await.unwrap();
        assert_eq!(emails.iter().map(|t| t.nome.as_str()).collect::<Vec<_>>(), ["Alfa", "Zeta"]);
        assert!(!emails[1].id.is_empty());
        assert!(servico.buscar(Canal::Email, "b").await.is_err());
        assert_eq!(servico.buscar(Canal::EmailB2b, "b").await.unwrap().atualizado_em, data(1));

        servico.remover(Canal::Email, "a").await.unwrap();
        assert!(matches!(servico.remover(Canal::Email, "a").await, Err(AppError::NotFound(_))));
        assert!(servico.listar(Canal::Whatsapp).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_and_seeding() {
        let servico = ServicoTemplates::new(Arc::new(MemoryStore::new()));
        let mut vazio = template("x", "Vazio", Canal::Whatsapp);
        vazio.corpo = "  ".into();
        assert!(matches!(
            servico.salvar(Canal::Whatsapp, vazio, data(1)).await,
            Err(AppError::ValidationError(_))
        ));

        let padroes = vec![template("p1", "Padrão", Canal::Whatsapp), template("p2", "Padrão", Canal::Email)];
        assert_eq!(servico.semear_padroes(&padroes).await.unwrap(), 2);
        assert_eq!(servico.semear_padroes(&padroes).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seed_file_loads() {
        let padroes = Template::carregar_padroes("config/templates.yaml").unwrap();
        let servico = ServicoTemplates::new(Arc::new(MemoryStore::new()));
        assert_eq!(servico.semear_padroes(&padroes).await.unwrap(), padroes.len());
    }
}
