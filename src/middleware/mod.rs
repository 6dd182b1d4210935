/// Middleware layer para o Axum router
///
/// - Controle de acesso por papel (Leitor, Operador, Admin)

pub mod auth;

pub use auth::{exigir_admin, exigir_leitor, exigir_operador, HEADER_UID};
