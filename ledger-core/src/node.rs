use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ledger_shared::{LedgerError, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chain::Chain;
use crate::miner::Miner;
use crate::protocol::{Message, MessageType};
use crate::transaction::Transaction;

/// Tempo máximo de espera por uma resposta ao falar com um peer.
const PEER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Um nó completo: um listener TCP, uma [`Chain`] compartilhada, um
/// conjunto de peers conhecidos e o estado de uma mineração em
/// andamento, se houver.
///
/// Toda mutação da cadeia ou do conjunto de peers passa por um mutex
/// grosso (`tokio::sync::Mutex`) — uma única trava por nó, suficiente
/// para preservar os invariantes da cadeia sob acesso concorrente de
/// múltiplas tasks, ao custo de serializar operações que poderiam em
/// princípio ser independentes.
pub struct Node {
    address: String,
    chain: Arc<Mutex<Chain>>,
    peers: Arc<Mutex<HashSet<String>>>,
    running: Arc<AtomicBool>,
    mining_cancel: Arc<Mutex<Option<Arc<AtomicBool>>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Cria um nó ainda não iniciado, identificado por `address`
    /// (`host:port`) — usado tanto para vincular o listener quanto
    /// como identidade própria nas mensagens que envia e na
    /// autoexclusão do conjunto de peers.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            chain: Arc::new(Mutex::new(Chain::new())),
            peers: Arc::new(Mutex::new(HashSet::new())),
            running: Arc::new(AtomicBool::new(false)),
            mining_cancel: Arc::new(Mutex::new(None)),
            accept_task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Uma cópia da cadeia corrente — útil para testes e para
    /// inspeção externa sem expor o mutex.
    pub async fn snapshot_chain(&self) -> Chain {
        self.chain.lock().await.clone()
    }

    /// Os peers conhecidos no momento.
    pub async fn peer_set(&self) -> HashSet<String> {
        self.peers.lock().await.clone()
    }

    /// Vincula um listener TCP em `self.address`, assume `running`, e
    /// dispara a task de aceitação em segundo plano.
    ///
    /// # Errors
    ///
    /// Retorna `BindFailed` se o endereço não puder ser vinculado —
    /// este é o único erro de todo o runtime do nó que deve se
    /// propagar ao operador em vez de apenas ser logado.
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)
            .await
            .map_err(|err| LedgerError::BindFailed(format!("{}: {err}", self.address)))?;

        self.running.store(true, Ordering::Relaxed);
        info!(address = %self.address, "nó escutando");

        let chain = Arc::clone(&self.chain);
        let peers = Arc::clone(&self.peers);
        let running = Arc::clone(&self.running);
        let mining_cancel = Arc::clone(&self.mining_cancel);
        let self_address = self.address.clone();

        let handle = tokio::spawn(async move {
            accept_loop(listener, chain, peers, running, mining_cancel, self_address).await;
        });

        *self.accept_task.lock().await = Some(handle);
        Ok(())
    }

    /// Marca o nó como parado, cancela qualquer mineração em
    /// andamento e encerra a task de aceitação. Handlers já em
    /// andamento podem terminar seu ciclo de requisição/resposta.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);

        if let Some(cancel) = self.mining_cancel.lock().await.as_ref() {
            cancel.store(true, Ordering::Relaxed);
        }

        if let Some(handle) = self.accept_task.lock().await.take() {
            handle.abort();
        }

        info!(address = %self.address, "nó parado");
    }

    /// Abre uma conexão curta com `addr`, envia PING e, se obtiver
    /// resposta, adiciona `addr` ao conjunto de peers. Recusa
    /// conectar-se a si mesmo.
    pub async fn connect_to_peer(&self, addr: &str) {
        if addr == self.address {
            debug!(addr, "ignorando tentativa de conexão consigo mesmo");
            return;
        }

        match request(addr, Message::ping(self.address.clone())).await {
            Ok(Some(_reply)) => {
                self.peers.lock().await.insert(addr.to_string());
                info!(peer = addr, "peer conectado");
            }
            Ok(None) => {
                warn!(peer = addr, "conexão fechada sem resposta ao PING, peer não adicionado");
            }
            Err(err) => {
                warn!(peer = addr, error = %err, "falha ao conectar ao peer");
            }
        }
    }

    /// Pede a cadeia de cada peer conhecido e adota a primeira
    /// estritamente mais longa e válida que encontrar.
    pub async fn sync_blockchain(&self) {
        let peer_snapshot: Vec<String> = self.peers.lock().await.iter().cloned().collect();

        for peer in peer_snapshot {
            let reply = request(&peer, Message::request_chain(self.address.clone())).await;
            let message = match reply {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(err) => {
                    warn!(peer = %peer, error = %err, "falha ao sincronizar com peer");
                    continue;
                }
            };

            let candidate = match message.as_blockchain() {
                Ok(candidate) => candidate,
                Err(err) => {
                    warn!(peer = %peer, error = %err, "resposta de cadeia malformada");
                    continue;
                }
            };

            let replaced = self.chain.lock().await.replace_chain(candidate.chain);
            if replaced {
                info!(peer = %peer, "cadeia substituída via sincronização");
                break;
            }
        }
    }

    /// Tenta admitir `tx` localmente; só em caso de sucesso a
    /// retransmite como `NEW_TRANSACTION` para todos os peers.
    pub async fn broadcast_transaction(&self, tx: Transaction) -> bool {
        let accepted = self.chain.lock().await.add_transaction(tx.clone());
        if accepted {
            let message = Message::new_transaction(&tx, self.address.clone());
            self.fan_out(message, None).await;
        }
        accepted
    }

    /// Tenta admitir `block` localmente; só em caso de sucesso o
    /// retransmite como `NEW_BLOCK` para todos os peers.
    pub async fn broadcast_block(&self, block: crate::block::Block) -> bool {
        let accepted = self.chain.lock().await.add_block(block.clone());
        if accepted {
            let message = Message::new_block(&block, self.address.clone());
            self.fan_out(message, None).await;
        }
        accepted
    }

    /// Envia `message` para todo peer conhecido exceto `exclude`
    /// (usado para a exclusão do remetente no gossip).
    async fn fan_out(&self, message: Message, exclude: Option<&str>) {
        let peer_snapshot: Vec<String> = self.peers.lock().await.iter().cloned().collect();

        for peer in peer_snapshot {
            if Some(peer.as_str()) == exclude {
                continue;
            }
            if let Err(err) = request(&peer, message.clone()).await {
                warn!(peer = %peer, error = %err, "falha ao retransmitir para peer");
            }
        }
    }

    /// Minera um bloco sobre o mempool corrente e, se bem-sucedido,
    /// o transmite aos peers. Roda a busca em uma thread bloqueante
    /// dedicada, já que é trabalho síncrono ligado à CPU.
    pub async fn mine(&self) -> Option<crate::block::Block> {
        let miner = Miner::new(self.address.clone());
        *self.mining_cancel.lock().await = Some(miner.cancel_flag());

        let chain_snapshot = self.chain.lock().await.clone();
        let block = tokio::task::spawn_blocking(move || miner.mine_block_sync(&chain_snapshot, None, None))
            .await
            .unwrap_or(None);

        *self.mining_cancel.lock().await = None;

        if let Some(block) = block {
            if self.broadcast_block(block.clone()).await {
                return Some(block);
            }
        }
        None
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: TcpListener,
    chain: Arc<Mutex<Chain>>,
    peers: Arc<Mutex<HashSet<String>>>,
    running: Arc<AtomicBool>,
    mining_cancel: Arc<Mutex<Option<Arc<AtomicBool>>>>,
    self_address: String,
) {
    while running.load(Ordering::Relaxed) {
        let (socket, remote) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                if running.load(Ordering::Relaxed) {
                    warn!(error = %err, "falha ao aceitar conexão");
                }
                continue;
            }
        };

        debug!(%remote, "conexão aceita");

        let chain = Arc::clone(&chain);
        let peers = Arc::clone(&peers);
        let mining_cancel = Arc::clone(&mining_cancel);
        let self_address = self_address.clone();

        tokio::spawn(async move {
            if let Err(err) =
                handle_connection(socket, chain, peers, mining_cancel, self_address).await
            {
                warn!(error = %err, "erro ao tratar conexão");
            }
        });
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    chain: Arc<Mutex<Chain>>,
    peers: Arc<Mutex<HashSet<String>>>,
    mining_cancel: Arc<Mutex<Option<Arc<AtomicBool>>>>,
    self_address: String,
) -> Result<()> {
    let message = Message::decode(&mut socket).await?;
    let sender = message.sender.clone();

    match message.message_type {
        MessageType::NewTransaction => {
            let tx = message.as_transaction()?;
            let accepted = chain.lock().await.add_transaction(tx.clone());
            if accepted {
                let rebroadcast = Message::new_transaction(&tx, self_address);
                fan_out_excluding(&peers, rebroadcast, &sender).await;
            }
        }
        MessageType::NewBlock => {
            let block = message.as_block()?;
            let accepted = chain.lock().await.add_block(block.clone());
            if accepted {
                if let Some(cancel) = mining_cancel.lock().await.as_ref() {
                    cancel.store(true, Ordering::Relaxed);
                }
                let rebroadcast = Message::new_block(&block, self_address);
                fan_out_excluding(&peers, rebroadcast, &sender).await;
            }
        }
        MessageType::RequestChain => {
            let snapshot = chain.lock().await.clone();
            let reply = Message::response_chain(&snapshot, self_address);
            reply.write_to(&mut socket).await?;
        }
        MessageType::ResponseChain => {
            let candidate = message.as_blockchain()?;
            chain.lock().await.replace_chain(candidate.chain);
        }
        MessageType::Ping => {
            let reply = Message::pong(self_address);
            reply.write_to(&mut socket).await?;
        }
        MessageType::Pong => {}
        MessageType::DiscoverPeers => {
            let known: Vec<String> = peers.lock().await.iter().cloned().collect();
            let reply = Message::peers_list(&known, self_address);
            reply.write_to(&mut socket).await?;
        }
        MessageType::PeersList => {
            let received = message.as_peers()?;
            let mut guard = peers.lock().await;
            for peer in received {
                if peer != self_address {
                    guard.insert(peer);
                }
            }
        }
    }

    Ok(())
}

async fn fan_out_excluding(peers: &Arc<Mutex<HashSet<String>>>, message: Message, exclude: &str) {
    let peer_snapshot: Vec<String> = peers.lock().await.iter().cloned().collect();
    for peer in peer_snapshot {
        if peer == exclude {
            continue;
        }
        if let Err(err) = request(&peer, message.clone()).await {
            warn!(peer = %peer, error = %err, "falha ao retransmitir para peer");
        }
    }
}

/// Abre uma conexão curta com `addr`, envia `message`, e tenta ler
/// uma única resposta com um timeout de leitura finito. Retorna
/// `Ok(None)` se o peer fechar a conexão sem responder.
///
/// # Errors
///
/// Retorna `PeerUnreachable` se a conexão não puder ser estabelecida
/// e `PeerTimeout` se nenhuma resposta chegar dentro do prazo.
async fn request(addr: &str, message: Message) -> Result<Option<Message>> {
    let mut socket = TcpStream::connect(addr)
        .await
        .map_err(|err| LedgerError::PeerUnreachable(format!("{addr}: {err}")))?;

    message.write_to(&mut socket).await?;

    match tokio::time::timeout(PEER_READ_TIMEOUT, Message::decode(&mut socket)).await {
        Ok(Ok(reply)) => Ok(Some(reply)),
        Ok(Err(LedgerError::Io(err))) if is_clean_close(&err) => Ok(None),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(LedgerError::PeerTimeout(format!(
            "sem resposta de {addr} em {PEER_READ_TIMEOUT:?}"
        ))),
    }
}

fn is_clean_close(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spawn_node(address: &str) -> Node {
        let node = Node::new(address.to_string());
        node.start().await.expect("bind should succeed in tests");
        node
    }

    #[tokio::test]
    async fn ping_adds_peer_on_success() {
        let a = spawn_node("127.0.0.1:18801").await;
        let b = spawn_node("127.0.0.1:18802").await;

        a.connect_to_peer(b.address()).await;
        assert!(a.peer_set().await.contains(b.address()));

        a.stop().await;
        b.stop().await;
    }

    #[tokio::test]
    async fn broadcast_transaction_reaches_connected_peer() {
        let a = spawn_node("127.0.0.1:18811").await;
        let b = spawn_node("127.0.0.1:18812").await;

        a.connect_to_peer(b.address()).await;

        let funding = Transaction::new("coinbase", "alice", 100.0).unwrap();
        assert!(a.broadcast_transaction(funding).await);

        let tx = Transaction::new("alice", "bob", 10.0).unwrap();
        let tx_id = tx.id.clone();
        assert!(a.broadcast_transaction(tx.clone()).await);
        assert!(!a.broadcast_transaction(tx).await);

        tokio::time::sleep(Duration::from_millis(200)).await;

        let b_chain = b.snapshot_chain().await;
        assert!(b_chain.pending_transactions.iter().any(|t| t.id == tx_id));

        a.stop().await;
        b.stop().await;
    }

    #[tokio::test]
    async fn sync_adopts_longer_valid_chain() {
        let a = spawn_node("127.0.0.1:18821").await;
        let b = spawn_node("127.0.0.1:18822").await;

        {
            let mut chain = a.chain.lock().await;
            let tx = Transaction::new("coinbase", "alice", 10.0).unwrap();
            chain.add_transaction(tx);
            let miner = Miner::new("miner".to_string());
            let block = miner.mine_block_sync(&chain, None, None).unwrap();
            chain.add_block(block);
        }

        b.connect_to_peer(a.address()).await;
        b.sync_blockchain().await;

        let synced = b.snapshot_chain().await;
        assert_eq!(synced.chain.len(), 2);

        a.stop().await;
        b.stop().await;
    }
}
