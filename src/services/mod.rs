pub mod catalogo;
pub mod dados_cliente;
pub mod dashboard;
pub mod erros_contato;
pub mod notificacoes;
pub mod registro;
pub mod relatorios;
pub mod repositorio;
pub mod templates;
pub mod transicoes;
pub mod usuarios;

pub use catalogo::CatalogoAtivos;
pub use dados_cliente::{DadosClienteApi, FonteClientes};
pub use dashboard::PainelState;
pub use erros_contato::ServicoErrosContato;
pub use notificacoes::ServicoNotificacoes;
pub use registro::ServicoRegistro;
pub use repositorio::RepositorioProtocolos;
pub use templates::ServicoTemplates;
pub use transicoes::ServicoTransicoes;
pub use usuarios::ServicoUsuarios;
