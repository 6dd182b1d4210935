pub mod erro_contato;
pub mod protocolo;
pub mod template;
pub mod usuario;

pub use erro_contato::{ErroContato, Requisicao};
pub use protocolo::{ClienteAfetado, JanelaDividida, Protocolo, StatusProtocolo, TipoProtocolo};
pub use template::Template;
pub use usuario::{Papel, Usuario};
