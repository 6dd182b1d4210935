use tracing::{debug, error, info, warn};

pub fn log_request_received(endpoint: &str, method: &str) {
    info!("Request received: {} {}", method, endpoint);
}

pub fn log_request_processed(endpoint: &str, status: u16, duration_ms: u64) {
    info!("Request processed: {} - Status: {} - Duration: {}ms",
          endpoint, status, duration_ms);
}

pub fn log_transicao(numero: &str, de: &str, para: &str) {
    info!("🔁 Protocolo {} movido: {} → {}", numero, de, para);
}

pub fn log_protocolo_registrado(numero: &str, total_afetados: usize) {
    info!("📝 Protocolo {} registrado ({} clientes afetados)", numero, total_afetados);
}

pub fn log_protocolo_excluido(numero: &str, colecoes: usize) {
    info!("🗑️ Protocolo {} excluído de {} coleção(ões)", numero, colecoes);
}

pub fn log_store_error(operacao: &str, error: &str) {
    error!("Store error: {} - Error: {}", operacao, error);
}

pub fn log_upstream_error(endpoint: &str, status: Option<u16>, error: &str) {
    error!("Upstream API error: {} - Status: {:?} - Error: {}", endpoint, status, error);
}

pub fn log_config_loaded(env: &str) {
    info!("Configuration loaded successfully for environment: {}", env);
}

pub fn log_server_startup(port: u16) {
    info!("🚀 Protocolos de manutenção starting on port {}", port);
}

pub fn log_server_ready(port: u16) {
    info!("✅ Server ready and listening on http://0.0.0.0:{}", port);
}

pub fn log_health_check() {
    debug!("Health check requested");
}

pub fn log_validation_error(field: &str, message: &str) {
    warn!("Validation error: {} - {}", field, message);
}

pub fn log_info(message: &str) {
    info!("{}", message);
}

pub fn log_error(message: &str) {
    error!("{}", message);
}

pub fn log_warning(message: &str) {
    warn!("{}", message);
}
