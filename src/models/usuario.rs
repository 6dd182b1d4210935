use serde::{Deserialize, Serialize};

/// Papel do usuário; a ordem da declaração define a hierarquia
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Papel {
    Leitor,
    Operador,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usuario {
    pub uid: String,
    pub nome: String,
    pub email: String,
    pub papel: Papel,
    #[serde(default = "ativo_padrao")]
    pub ativo: bool,
}

fn ativo_padrao() -> bool {
    true
}

impl Usuario {
    pub fn pode(&self, minimo: Papel) -> bool {
        self.ativo && self.papel >= minimo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        let mut u = Usuario {
            uid: "u1".into(),
            nome: "Bia".into(),
            email: "bia@noc.com".into(),
            papel: Papel::Operador,
            ativo: true,
        };
        assert!(u.pode(Papel::Leitor));
        assert!(u.pode(Papel::Operador));
        assert!(!u.pode(Papel::Admin));
        u.ativo = false;
        assert!(!u.pode(Papel::Leitor));
    }
}
