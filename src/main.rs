/// Main Application: backend de protocolos de manutenção
///
/// Arquitetura:
/// - Rotas axum com controle de acesso por papel (Leitor, Operador, Admin)
/// - Transições de status gravadas em lotes atômicos no armazenamento de documentos
/// - Painel mantido em memória por assinaturas das coleções de status
/// - Avisos entregues pela fila da mensageria (retry por destinatário)

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use mensageria::{ConfigFila, Endpoints, EstadoDespacho, FilaEntrega, RemetenteHttp};
use protocolos_manutencao::middleware::{exigir_admin, exigir_leitor, exigir_operador};
use protocolos_manutencao::models::Template;
use protocolos_manutencao::services::dashboard::iniciar_assinaturas;
use protocolos_manutencao::services::notificacoes::registrar_resultado;
use protocolos_manutencao::services::{CatalogoAtivos, DadosClienteApi, RepositorioProtocolos};
use protocolos_manutencao::store::{DocumentStore, FirestoreStore, MemoryStore};
use protocolos_manutencao::{config::Settings, utils::logging::*, utils::AppError, AppState};

mod handlers;

use handlers::*;

fn criar_router(state: Arc<AppState>) -> Router {
    let leitor = middleware::from_fn_with_state(state.clone(), exigir_leitor);
    let operador = middleware::from_fn_with_state(state.clone(), exigir_operador);
    let admin = middleware::from_fn_with_state(state.clone(), exigir_admin);

    // Health checks (públicos)
    let publicas = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check));

    let leitura = Router::new()
        .route("/dashboard", get(painel))
        .route("/dashboard/clientes-afetados", get(clientes_afetados))
        .route("/relatorios/protocolos", get(relatorio_protocolos))
        .route_layer(leitor.clone());

    let operacao = Router::new()
        .route("/protocolos", post(registrar_protocolo))
        .route("/protocolos/:id/avancar", post(avancar_protocolo))
        .route("/protocolos/:id/concluir", post(concluir_protocolo))
        .route("/protocolos/:id/reagendar", post(reagendar_protocolo))
        .route("/protocolos/:id/reabrir", post(reabrir_protocolo))
        .route("/protocolos/:id/notificar", post(notificar_protocolo))
        .route("/notificacoes/:id", get(status_despacho))
        .route("/erros-contato", get(listar_erros_contato))
        .route("/erros-contato/:id", delete(remover_erro_contato))
        .route_layer(operador.clone());

    // GET recebe o número do protocolo; DELETE, o id do documento
    let protocolo = Router::new().route(
        "/protocolos/:id",
        get(buscar_protocolo)
            .route_layer(leitor)
            .merge(delete(excluir_protocolo).route_layer(operador)),
    );

    let administracao = Router::new()
        .route("/templates/:canal", get(listar_templates).post(criar_template))
        .route("/templates/:canal/:id", put(atualizar_template).delete(remover_template))
        .route("/usuarios", get(listar_usuarios))
        .route("/usuarios/:uid", put(atualizar_usuario))
        .route_layer(admin);

    Router::new()
        .merge(publicas)
        .merge(leitura)
        .merge(operacao)
        .merge(protocolo)
        .merge(administracao)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Fila de entrega com gravação do resultado de cada despacho
fn iniciar_fila(settings: &Settings, repositorio: RepositorioProtocolos) -> Result<FilaEntrega, AppError> {
    let notificacoes = &settings.notificacoes;
    let remetente = RemetenteHttp::new(
        Endpoints {
            email: notificacoes.email_url.clone(),
            whatsapp: notificacoes.whatsapp_url.clone(),
            email_b2b: notificacoes.email_b2b_url.clone(),
        },
        notificacoes.timeout_seconds,
    )
    .map_err(|e| AppError::ConfigError(e.to_string()))?;

    let config = ConfigFila {
        max_tentativas: notificacoes.max_tentativas,
        backoff_inicial_ms: notificacoes.backoff_inicial_ms,
        capacidade: notificacoes.capacidade_fila,
        retencao: Duration::from_secs(notificacoes.retencao_segundos),
    };

    Ok(FilaEntrega::iniciar_com_callback(
        Arc::new(remetente),
        config,
        Some(Arc::new(move |estado: EstadoDespacho| {
            let repositorio = repositorio.clone();
            tokio::spawn(async move {
                if let Err(e) = registrar_resultado(&repositorio, &estado, Utc::now()).await {
                    log_store_error(&format!("resultado do despacho {}", estado.id), &e.to_string());
                }
            });
        })),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 🔧 Carregar variáveis de ambiente do arquivo .env (se existir)
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match dotenv {
        Ok(_) => tracing::info!("✅ Arquivo .env carregado com sucesso"),
        Err(_) => tracing::debug!("Arquivo .env não encontrado - usando variáveis de ambiente do sistema"),
    }

    // Carregar configurações
    let settings = Settings::new()
        .map_err(|e| AppError::ConfigError(format!("Failed to load settings: {}", e)))?;

    log_config_loaded(&std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string()));

    let store: Arc<dyn DocumentStore> = match settings.store.backend.as_str() {
        "firestore" => {
            log_info("🔥 Backend de documentos: Firestore");
            Arc::new(FirestoreStore::new(&settings.store)?)
        }
        "memory" => {
            log_warning("⚠️ Backend de documentos em memória: dados não persistem entre execuções");
            Arc::new(MemoryStore::new())
        }
        outro => {
            return Err(AppError::ConfigError(format!("Backend de armazenamento desconhecido: {}", outro)).into());
        }
    };

    let catalogo = Arc::new(CatalogoAtivos::carregar(&settings.assets)?);
    let fonte = Arc::new(DadosClienteApi::new(
        settings.enriquecimento.base_url.clone(),
        settings.enriquecimento.timeout_seconds,
    )?);
    let fila = iniciar_fila(&settings, RepositorioProtocolos::new(store.clone()))?;

    let state = Arc::new(AppState::new(settings.clone(), store.clone(), catalogo, fonte, fila));

    if let Some(caminho) = &settings.assets.templates {
        match Template::carregar_padroes(caminho) {
            Ok(padroes) => match state.templates.semear_padroes(&padroes).await {
                Ok(criados) => log_info(&format!("📄 {} template(s) padrão gravado(s)", criados)),
                Err(e) => log_warning(&format!("⚠️ Falha ao gravar templates padrão: {}", e)),
            },
            Err(e) => log_warning(&format!("⚠️ Templates padrão não carregados: {}", e)),
        }
    }

    let assinaturas = iniciar_assinaturas(store, state.painel.clone());
    log_info(&format!("📊 Painel assinando {} coleções de status", assinaturas.len()));

    let app = criar_router(state);

    // Iniciar servidor
    // No Cloud Run, usar a variável de ambiente PORT
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(settings.server.port);
    let listener = TcpListener::bind(format!("{}:{}", settings.server.host, port)).await?;

    log_server_startup(port);
    log_server_ready(port);

    // Graceful shutdown com signal handling
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for tarefa in assinaturas {
        tarefa.abort();
    }
    log_info("🛑 Server shut down gracefully");
    Ok(())
}

/// Signal handler para graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log_error(&format!("Falha ao instalar handler de Ctrl+C: {}", e));
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sinal) => {
                sinal.recv().await;
            }
            Err(e) => {
                log_error(&format!("Falha ao instalar handler de SIGTERM: {}", e));
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log_info("🛑 Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            log_info("🛑 Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use httpmock::prelude::*;
    use protocolos_manutencao::middleware::HEADER_UID;
    use protocolos_manutencao::store::{Colecao, Lote};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app(enriquecimento: &MockServer) -> Router {
        let settings = Settings::new().unwrap();
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

        let mut lote = Lote::new();
        for (uid, papel) in [("leitor", "leitor"), ("operador", "operador"), ("admin", "admin")] {
            lote.set(
                Colecao::Users,
                uid,
                json!({"uid": uid, "nome": uid, "email": format!("{}@noc.com", uid), "papel": papel}),
            );
        }
        store.commit(lote).await.unwrap();

        let catalogo = Arc::new(CatalogoAtivos::carregar(&settings.assets).unwrap());
        let fonte = Arc::new(DadosClienteApi::new(enriquecimento.base_url(), 5).unwrap());
        let fila = iniciar_fila(&settings, RepositorioProtocolos::new(store.clone())).unwrap();
        criar_router(Arc::new(AppState::new(settings, store, catalogo, fonte, fila)))
    }

    fn requisicao(metodo: &str, uri: &str, uid: Option<&str>, corpo: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(metodo).uri(uri);
        if let Some(uid) = uid {
            builder = builder.header(HEADER_UID, uid);
        }
        match corpo {
            Some(corpo) => builder
                .header("content-type", "application/json")
                .body(Body::from(corpo.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_de(resposta: axum::response::Response) -> Value {
        let bytes = to_bytes(resposta.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public_and_roles_are_enforced() {
        let server = MockServer::start();
        let app = app(&server).await;

        let health = app.clone().oneshot(requisicao("GET", "/health", None, None)).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let anonimo = app.clone().oneshot(requisicao("GET", "/dashboard", None, None)).await.unwrap();
        assert_eq!(anonimo.status(), StatusCode::UNAUTHORIZED);

        let leitor = app.clone().oneshot(requisicao("GET", "/dashboard", Some("leitor"), None)).await.unwrap();
        assert_eq!(leitor.status(), StatusCode::OK);

        let proibido = app
            .clone()
            .oneshot(requisicao("GET", "/usuarios", Some("operador"), None))
            .await
            .unwrap();
        assert_eq!(proibido.status(), StatusCode::FORBIDDEN);

        let usuarios = app.oneshot(requisicao("GET", "/usuarios", Some("admin"), None)).await.unwrap();
        assert_eq!(usuarios.status(), StatusCode::OK);
        assert_eq!(json_de(usuarios).await.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_register_then_advance_through_http() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/dadosCliente");
            then.status(200).json_body(json!([
                {"nome": "Ana", "codigo": "1"},
                {"nome": "Bia", "codigo": "2", "cancelado": true},
                {"nome": "Caio", "codigo": "3"}
            ]));
        });
        let app = app(&server).await;

        let form = json!({
            "numero": "12345",
            "tipo": "Programada",
            "data_inicial": "2024-01-01T10:00:00Z",
            "data_prevista": "2024-01-01T12:00:00Z",
            "pontos_acesso": ["OLT-RP-01"]
        });

        let negado = app
            .clone()
            .oneshot(requisicao("POST", "/protocolos", Some("leitor"), Some(form.clone())))
            .await
            .unwrap();
        assert_eq!(negado.status(), StatusCode::FORBIDDEN);

        let criado = app
            .clone()
            .oneshot(requisicao("POST", "/protocolos", Some("operador"), Some(form.clone())))
            .await
            .unwrap();
        assert_eq!(criado.status(), StatusCode::CREATED);
        let protocolo = json_de(criado).await;
        assert_eq!(protocolo["total_afetados"], 2);
        let id = protocolo["id"].as_str().unwrap().to_string();

        let duplicado = app
            .clone()
            .oneshot(requisicao("POST", "/protocolos", Some("operador"), Some(form)))
            .await
            .unwrap();
        assert_eq!(duplicado.status(), StatusCode::CONFLICT);

        let avancado = app
            .clone()
            .oneshot(requisicao("POST", &format!("/protocolos/{}/avancar", id), Some("operador"), None))
            .await
            .unwrap();
        assert_eq!(avancado.status(), StatusCode::OK);
        assert_eq!(json_de(avancado).await["status"], "Pendente");

        let espelho = app
            .clone()
            .oneshot(requisicao("GET", "/protocolos/12345", Some("leitor"), None))
            .await
            .unwrap();
        assert_eq!(json_de(espelho).await["status"], "Pendente");

        let concluir_cedo = app
            .clone()
            .oneshot(requisicao(
                "POST",
                &format!("/protocolos/{}/concluir", id),
                Some("operador"),
                Some(json!({"desfecho": "concluido"})),
            ))
            .await
            .unwrap();
        assert_eq!(concluir_cedo.status(), StatusCode::CONFLICT);

        let excluido = app
            .clone()
            .oneshot(requisicao("DELETE", &format!("/protocolos/{}", id), Some("operador"), None))
            .await
            .unwrap();
        assert_eq!(excluido.status(), StatusCode::OK);

        let sumiu = app
            .oneshot(requisicao("GET", "/protocolos/12345", Some("leitor"), None))
            .await
            .unwrap();
        assert_eq!(sumiu.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notify_without_recipients_is_bad_request() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/dadosCliente");
            then.status(200).json_body(json!([{"nome": "Ana", "codigo": "1", "telefone": "123"}]));
        });
        let app = app(&server).await;

        let template = app
            .clone()
            .oneshot(requisicao(
                "POST",
                "/templates/whatsapp",
                Some("admin"),
                Some(json!({"nome": "Aviso", "corpo": "Olá {{nome}}"})),
            ))
            .await
            .unwrap();
        assert_eq!(template.status(), StatusCode::CREATED);
        let id_template = json_de(template).await["id"].as_str().unwrap().to_string();

        let criado = app
            .clone()
            .oneshot(requisicao(
                "POST",
                "/protocolos",
                Some("operador"),
                Some(json!({
                    "numero": "777",
                    "tipo": "Emergencial",
                    "data_inicial": "2024-01-01T10:00:00Z",
                    "pontos_acesso": ["OLT-SC-01"]
                })),
            ))
            .await
            .unwrap();
        let id = json_de(criado).await["id"].as_str().unwrap().to_string();

        let disparo = app
            .oneshot(requisicao(
                "POST",
                &format!("/protocolos/{}/notificar", id),
                Some("operador"),
                Some(json!({"canal": "whatsapp", "template": id_template})),
            ))
            .await
            .unwrap();
        assert_eq!(disparo.status(), StatusCode::BAD_REQUEST);
    }
}
