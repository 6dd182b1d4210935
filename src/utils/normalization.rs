//! Normalização de texto para a busca do painel
//!
//! A busca livre compara número de protocolo e região ignorando acentos,
//! caixa e espaços repetidos ("São Paulo" casa com "sao   paulo").

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Remove acentos (NFKD), converte para lowercase e colapsa espaços
///
/// # Exemplos
/// ```
/// use protocolos_manutencao::utils::normalization::normalizar;
///
/// assert_eq!(normalizar("  São   Paulo "), "sao paulo");
/// assert_eq!(normalizar("Região NORTE"), "regiao norte");
/// ```
pub fn normalizar(input: &str) -> String {
    input
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `true` se `termo` normalizado aparece em algum dos campos
pub fn contem_normalizado(termo: &str, campos: &[&str]) -> bool {
    let termo = normalizar(termo);
    if termo.is_empty() {
        return true;
    }
    campos.iter().any(|campo| normalizar(campo).contains(&termo))
}

/// Mantém apenas dígitos (telefones)
pub fn somente_digitos(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}
