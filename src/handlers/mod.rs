// Handlers HTTP, agrupados por área
pub mod cadastros;
pub mod health;
pub mod notificacoes;
pub mod painel;
pub mod protocolos;

pub use cadastros::*;
pub use health::*;
pub use notificacoes::*;
pub use painel::*;
pub use protocolos::*;
