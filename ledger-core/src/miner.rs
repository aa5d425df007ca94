use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::block::Block;
use crate::chain::{Chain, DIFFICULTY};
use crate::transaction::Transaction;

/// A cada quantas tentativas de nonce o progresso é relatado e a flag
/// de cancelamento é checada.
const PROGRESS_INTERVAL: u64 = 10_000;

/// Busca por prova de trabalho, cancelável a qualquer momento por uma
/// flag compartilhada com o [`crate::node::Node`] que a possui.
///
/// A busca roda tipicamente dentro de `tokio::task::spawn_blocking`,
/// já que incrementar nonces e recalcular SHA-256 é trabalho síncrono
/// ligado à CPU — não deve bloquear o executor assíncrono.
pub struct Miner {
    miner_address: String,
    cancel: Arc<AtomicBool>,
}

impl Miner {
    /// Cria um minerador identificado por `miner_address`, com uma
    /// flag de cancelamento própria.
    #[must_use]
    pub fn new(miner_address: String) -> Self {
        Self {
            miner_address,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A flag de cancelamento compartilhável. Clonar o `Arc` e chamar
    /// `store(true, Ordering::Relaxed)` nele interrompe a busca em
    /// andamento no próximo checkpoint.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Sinaliza para que qualquer busca em andamento pare o quanto
    /// antes.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Tenta minerar um único bloco sobre o topo de `chain`.
    ///
    /// Se `transactions` for `None`, usa uma cópia do mempool corrente
    /// de `chain` — espelhando o comportamento de um nó que mina sobre
    /// suas próprias transações pendentes. Se a lista resultante
    /// estiver vazia, retorna `None` sem iniciar a busca.
    ///
    /// `on_progress`, se fornecido, é chamado a cada
    /// [`PROGRESS_INTERVAL`] tentativas com o nonce corrente.
    ///
    /// Retorna `None` se a busca for cancelada antes de encontrar um
    /// nonce válido. Esta é uma operação síncrona e ligada à CPU —
    /// quem a chama a partir de contexto assíncrono deve rodá-la via
    /// `tokio::task::spawn_blocking`.
    #[must_use]
    pub fn mine_block_sync(
        &self,
        chain: &Chain,
        transactions: Option<Vec<Transaction>>,
        on_progress: Option<&dyn Fn(u64)>,
    ) -> Option<Block> {
        self.cancel.store(false, Ordering::Relaxed);

        let transactions = transactions.unwrap_or_else(|| chain.pending_transactions.clone());
        if transactions.is_empty() {
            debug!(miner = %self.miner_address, "nada a minerar: lista de transações vazia");
            return None;
        }

        let index = chain.chain.len() as u64;
        let previous_hash = chain.last_block().hash.clone();
        let timestamp = crate::transaction::now_secs();

        let mut nonce: u64 = 0;
        loop {
            if nonce % PROGRESS_INTERVAL == 0 {
                if self.cancel.load(Ordering::Relaxed) {
                    debug!(nonce, "mineração cancelada");
                    return None;
                }
                if let Some(callback) = on_progress {
                    callback(nonce);
                }
            }

            let candidate = Block::new(
                index,
                previous_hash.clone(),
                transactions.clone(),
                nonce,
                timestamp,
            );

            if candidate.is_valid_hash(DIFFICULTY) {
                info!(index, nonce, hash = %candidate.hash, "bloco minerado");
                return Some(candidate);
            }

            match nonce.checked_add(1) {
                Some(next) => nonce = next,
                None => {
                    debug!("nonce esgotou u64 sem encontrar hash válido");
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_transaction_list_mines_nothing() {
        let chain = Chain::new();
        let miner = Miner::new("miner-address".to_string());

        assert!(miner.mine_block_sync(&chain, Some(Vec::new()), None).is_none());
        assert!(miner.mine_block_sync(&chain, None, None).is_none());
    }

    #[test]
    fn mines_a_valid_successor_block() {
        let mut chain = Chain::new();
        chain.add_transaction(Transaction::new("coinbase", "alice", 10.0).unwrap());

        let miner = Miner::new("miner-address".to_string());
        let block = miner
            .mine_block_sync(&chain, None, None)
            .expect("difficulty 000 is cheap enough to find quickly in tests");

        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, chain.last_block().hash);
        assert!(block.is_valid_hash(DIFFICULTY));
        assert!(block.hash_matches_content());
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].destino, "alice");
    }

    #[test]
    fn cancellation_flag_stops_search_before_completion() {
        let mut chain = Chain::new();
        chain.add_transaction(Transaction::new("coinbase", "alice", 10.0).unwrap());

        let miner = Miner::new("miner-address".to_string());
        miner.cancel_flag().store(true, Ordering::Relaxed);

        let result = miner.mine_block_sync(&chain, None, None);
        assert!(result.is_none());
    }

    #[test]
    fn progress_callback_is_invoked_when_search_runs_long_enough() {
        let mut chain = Chain::new();
        chain.add_transaction(Transaction::new("coinbase", "alice", 10.0).unwrap());

        let miner = Miner::new("miner-address".to_string());
        let calls = std::cell::RefCell::new(0u32);
        let on_progress = |_nonce: u64| {
            *calls.borrow_mut() += 1;
        };

        miner.mine_block_sync(&chain, None, Some(&on_progress));
        assert!(*calls.borrow() >= 1);
    }
}
