use thiserror::Error;

/// Erros da rede de ledger distribuído.
///
/// Agrupa os modos de falha de todo o crate num único tipo, no mesmo
/// espírito do `shared::BlockchainError` do qual este tipo deriva: um
/// `Result` por crate em vez de um tipo de erro por módulo.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("transação inválida: {0}")]
    InvalidTransaction(String),

    #[error("bloco inválido: {0}")]
    InvalidBlock(String),

    #[error("cadeia inválida: {0}")]
    InvalidChain(String),

    #[error("peer inalcançável: {0}")]
    PeerUnreachable(String),

    #[error("timeout ao falar com peer: {0}")]
    PeerTimeout(String),

    #[error("erro de protocolo com peer: {0}")]
    PeerProtocolError(String),

    #[error("falha ao vincular o socket de escuta: {0}")]
    BindFailed(String),

    #[error("erro de serialização: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("erro de I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias de `Result` usado em todo o workspace.
pub type Result<T> = std::result::Result<T, LedgerError>;
