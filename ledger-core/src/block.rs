use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::canonical::sha256_hex_of;
use crate::transaction::Transaction;

/// `previous_hash` do bloco gênese: 64 zeros hexadecimais.
pub const GENESIS_PREVIOUS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Um lote ordenado de transações mais o cabeçalho de prova de trabalho.
///
/// Imutável depois que `hash` é definido. O hash é o SHA-256 hexadecimal
/// minúsculo da codificação JSON canônica de todos os outros campos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub timestamp: f64,
    pub hash: String,
}

impl Block {
    /// Monta um bloco candidato e calcula seu hash a partir dos campos
    /// fornecidos. Usado tanto para blocos recém-minerados quanto para
    /// reconstruir um bloco já conhecido a partir de seus componentes.
    #[must_use]
    pub fn new(
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        nonce: u64,
        timestamp: f64,
    ) -> Self {
        let mut block = Self {
            index,
            previous_hash,
            transactions,
            nonce,
            timestamp,
            hash: String::new(),
        };
        block.hash = block.recompute_hash();
        block
    }

    /// O bloco gênese, idêntico bit a bit em toda implementação
    /// conforme — índice 0, `previous_hash` de 64 zeros, sem
    /// transações, nonce 0, timestamp 0.
    #[must_use]
    pub fn create_genesis() -> Self {
        Self::new(
            0,
            GENESIS_PREVIOUS_HASH.to_string(),
            Vec::new(),
            0,
            0.0,
        )
    }

    /// Recalcula o SHA-256 sobre a codificação canônica de
    /// `{index, previous_hash, transactions, nonce, timestamp}`.
    ///
    /// Nunca lê `self.hash` — por isso serve tanto para calcular o hash
    /// inicial quanto para verificar se um hash existente está correto.
    #[must_use]
    pub fn recompute_hash(&self) -> String {
        let value = json!({
            "index": self.index,
            "previous_hash": self.previous_hash,
            "transactions": self.transactions,
            "nonce": self.nonce,
            "timestamp": self.timestamp,
        });
        sha256_hex_of(&value)
    }

    /// Recalcula e grava `self.hash`. Usado pelo minerador a cada
    /// tentativa de nonce.
    pub fn refresh_hash(&mut self) {
        self.hash = self.recompute_hash();
    }

    /// Verdadeiro se `self.hash` começa com o prefixo de dificuldade.
    #[must_use]
    pub fn is_valid_hash(&self, difficulty: &str) -> bool {
        self.hash.starts_with(difficulty)
    }

    /// Verdadeiro se o hash armazenado corresponde ao recalculado.
    #[must_use]
    pub fn hash_matches_content(&self) -> bool {
        self.hash == self.recompute_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_hash_is_deterministic() {
        let a = Block::create_genesis();
        let b = Block::create_genesis();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(a.previous_hash.len(), 64);
    }

    #[test]
    fn genesis_hash_matches_cross_implementation_fixture() {
        let genesis = Block::create_genesis();
        assert_eq!(
            genesis.hash,
            "120a20ac98dae66f4b655cc4cd95d496fc4711db3d087bead6522d5dafcb058a"
        );
    }

    #[test]
    fn hash_is_recomputable() {
        let block = Block::new(1, GENESIS_PREVIOUS_HASH.to_string(), vec![], 0, 123.0);
        assert!(block.hash_matches_content());
    }

    #[test]
    fn tampering_breaks_hash_match() {
        let mut block = Block::new(1, GENESIS_PREVIOUS_HASH.to_string(), vec![], 0, 123.0);
        block.nonce = 999;
        assert!(!block.hash_matches_content());
    }

    #[test]
    fn difficulty_prefix_check() {
        let mut block = Block::create_genesis();
        block.hash = "000abc".to_string();
        assert!(block.is_valid_hash("000"));
        block.hash = "0abc".to_string();
        assert!(!block.is_valid_hash("000"));
    }
}
