use std::hash::{Hash, Hasher};

use ledger_shared::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Nomes de origem reservados que dispensam verificação de saldo.
pub const SOURCE_GENESIS: &str = "genesis";
pub const SOURCE_COINBASE: &str = "coinbase";

/// Uma transferência de valor entre dois endereços.
///
/// Imutável após criada. A igualdade e o hash consideram apenas `id`,
/// de modo que o mempool possa tratar transações por identidade, não
/// por conteúdo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub origem: String,
    pub destino: String,
    pub valor: f64,
    pub timestamp: f64,
}

impl Transaction {
    /// Cria uma nova transação com id e timestamp gerados.
    ///
    /// # Errors
    ///
    /// Retorna `InvalidTransaction` se `valor` não for positivo ou se
    /// `origem`/`destino` forem vazios.
    pub fn new(
        origem: impl Into<String>,
        destino: impl Into<String>,
        valor: f64,
    ) -> Result<Self> {
        let origem = origem.into();
        let destino = destino.into();

        if valor <= 0.0 {
            return Err(LedgerError::InvalidTransaction(
                "valor da transação deve ser positivo".to_string(),
            ));
        }
        if origem.is_empty() || destino.is_empty() {
            return Err(LedgerError::InvalidTransaction(
                "origem e destino são obrigatórios".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            origem,
            destino,
            valor,
            timestamp: now_secs(),
        })
    }

    /// Verdadeiro se a origem dispensa checagem de saldo.
    #[must_use]
    pub fn is_privileged_source(&self) -> bool {
        self.origem == SOURCE_GENESIS || self.origem == SOURCE_COINBASE
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Transaction {}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Segundos desde a época Unix, com precisão de ponto flutuante —
/// equivalente a `time.time()` da fonte original.
pub(crate) fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_value() {
        assert!(Transaction::new("alice", "bob", 0.0).is_err());
        assert!(Transaction::new("alice", "bob", -5.0).is_err());
    }

    #[test]
    fn rejects_empty_addresses() {
        assert!(Transaction::new("", "bob", 10.0).is_err());
        assert!(Transaction::new("alice", "", 10.0).is_err());
    }

    #[test]
    fn accepts_valid_transaction() {
        let tx = Transaction::new("alice", "bob", 10.0).unwrap();
        assert_eq!(tx.origem, "alice");
        assert_eq!(tx.destino, "bob");
        assert!(!tx.id.is_empty());
    }

    #[test]
    fn equality_is_id_based() {
        let a = Transaction::new("alice", "bob", 10.0).unwrap();
        let mut b = a.clone();
        b.valor = 99.0;
        assert_eq!(a, b);

        let c = Transaction::new("alice", "bob", 10.0).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn privileged_sources() {
        let tx = Transaction::new(SOURCE_COINBASE, "alice", 100.0).unwrap();
        assert!(tx.is_privileged_source());
        let tx2 = Transaction::new("alice", "bob", 1.0).unwrap();
        assert!(!tx2.is_privileged_source());
    }
}
