use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::transaction::Transaction;

/// Prefixo hexadecimal exigido de um hash de bloco válido.
pub const DIFFICULTY: &str = "000";

/// A cadeia validada de blocos, mais o pool de transações pendentes.
///
/// `chain[0]` é sempre o bloco gênese canônico. Toda mutação pública
/// preserva os invariantes 1–6: encadeamento de hashes, prova de
/// trabalho, unicidade de transações por `id` em toda a cadeia e o
/// mempool, e saldo não-negativo na admissão ao mempool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    /// Cria uma cadeia nova contendo apenas o bloco gênese.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chain: vec![Block::create_genesis()],
            pending_transactions: Vec::new(),
        }
    }

    /// O bloco mais recente da cadeia.
    ///
    /// # Panics
    ///
    /// Nunca — o gênese garante que `chain` nunca fica vazia.
    #[must_use]
    pub fn last_block(&self) -> &Block {
        self.chain.last().expect("genesis sempre presente")
    }

    /// Saldo líquido de `address`: soma de créditos menos débitos, em
    /// toda a cadeia **e** no mempool. Um endereço com envios pendentes
    /// não confirmados pode aparecer com saldo negativo — ver Design
    /// Notes sobre esta escolha deliberada.
    #[must_use]
    pub fn get_balance(&self, address: &str) -> f64 {
        let mut balance = 0.0;

        for block in &self.chain {
            for tx in &block.transactions {
                if tx.destino == address {
                    balance += tx.valor;
                }
                if tx.origem == address {
                    balance -= tx.valor;
                }
            }
        }

        for tx in &self.pending_transactions {
            if tx.destino == address {
                balance += tx.valor;
            }
            if tx.origem == address {
                balance -= tx.valor;
            }
        }

        balance
    }

    fn transaction_known(&self, id: &str) -> bool {
        self.pending_transactions.iter().any(|tx| tx.id == id)
            || self
                .chain
                .iter()
                .any(|block| block.transactions.iter().any(|tx| tx.id == id))
    }

    /// Tenta admitir `transaction` no mempool.
    ///
    /// Falha silenciosamente (retorna `false`, sem mutação) se a
    /// transação já é conhecida por `id`, ou se sua origem não é
    /// privilegiada e o saldo corrente é insuficiente.
    pub fn add_transaction(&mut self, transaction: Transaction) -> bool {
        if self.transaction_known(&transaction.id) {
            return false;
        }

        if !transaction.is_privileged_source() {
            let balance = self.get_balance(&transaction.origem);
            if balance < transaction.valor {
                return false;
            }
        }

        self.pending_transactions.push(transaction);
        true
    }

    /// Tenta adicionar `block` ao fim da cadeia.
    ///
    /// Falha silenciosamente se `block` não passa em
    /// [`Chain::is_valid_block`]. Em caso de sucesso, remove do
    /// mempool toda transação incluída no bloco antes de anexá-lo.
    pub fn add_block(&mut self, block: Block) -> bool {
        if !self.is_valid_block(&block) {
            return false;
        }

        for tx in &block.transactions {
            self.pending_transactions.retain(|pending| pending.id != tx.id);
        }

        self.chain.push(block);
        true
    }

    /// Valida `block` como possível próximo bloco da cadeia: índice
    /// correto, encadeamento de hash, prova de trabalho e
    /// autoconsistência do hash. Não revalida saldos — isso já
    /// aconteceu na admissão ao mempool (ou na validação de cadeia
    /// completa durante a sincronização).
    #[must_use]
    pub fn is_valid_block(&self, block: &Block) -> bool {
        let expected_index = self.chain.len() as u64;
        if block.index != expected_index {
            return false;
        }
        if block.previous_hash != self.last_block().hash {
            return false;
        }
        if !block.is_valid_hash(DIFFICULTY) {
            return false;
        }
        if !block.hash_matches_content() {
            return false;
        }
        true
    }

    /// Valida uma cadeia candidata de ponta a ponta: não vazia, gênese
    /// idêntico ao canônico, e para cada bloco subsequente o
    /// encadeamento de hash, a prova de trabalho e a autoconsistência
    /// do hash.
    #[must_use]
    pub fn is_valid_chain(candidate: &[Block]) -> bool {
        let Some(first) = candidate.first() else {
            return false;
        };

        let genesis = Block::create_genesis();
        if first.hash != genesis.hash {
            return false;
        }

        for window in candidate.windows(2) {
            let [previous, current] = window else {
                unreachable!("windows(2) sempre produz slices de 2 elementos")
            };

            if current.previous_hash != previous.hash {
                return false;
            }
            if !current.hash_matches_content() {
                return false;
            }
            if !current.is_valid_hash(DIFFICULTY) {
                return false;
            }
        }

        true
    }

    /// Substitui a cadeia corrente por `new_chain` se ela for
    /// estritamente mais longa e totalmente válida. O mempool não é
    /// tocado: transações pendentes sobrevivem à troca mesmo que já
    /// estejam confirmadas na cadeia adotada (ver Design Notes).
    pub fn replace_chain(&mut self, new_chain: Vec<Block>) -> bool {
        if new_chain.len() <= self.chain.len() {
            return false;
        }
        if !Self::is_valid_chain(&new_chain) {
            return false;
        }

        self.chain = new_chain;
        true
    }
}
