use ledger_shared::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::block::Block;
use crate::chain::Chain;
use crate::transaction::Transaction;

/// Tamanho máximo aceito para o corpo de uma mensagem, em bytes.
///
/// Protege um nó de um peer malicioso ou quebrado anunciando um
/// comprimento absurdo e esgotando a memória antes que o corpo chegue.
const MAX_MESSAGE_BYTES: u32 = 16 * 1024 * 1024;

/// Os oito tipos de mensagem do protocolo de gossip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    NewTransaction,
    NewBlock,
    RequestChain,
    ResponseChain,
    Ping,
    Pong,
    DiscoverPeers,
    PeersList,
}

/// Um envelope de mensagem trocado entre nós.
///
/// `payload` carrega um valor JSON cuja forma depende de
/// `message_type` — ver os construtores `new_*` e os extratores
/// `as_*` abaixo, que são as únicas formas suportadas de montar e
/// interpretar mensagens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: Value,
    pub sender: String,
}

impl Message {
    #[must_use]
    pub fn new_transaction(transaction: &Transaction, sender: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::NewTransaction,
            payload: json!({ "transaction": transaction }),
            sender: sender.into(),
        }
    }

    #[must_use]
    pub fn new_block(block: &Block, sender: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::NewBlock,
            payload: json!({ "block": block }),
            sender: sender.into(),
        }
    }

    #[must_use]
    pub fn request_chain(sender: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::RequestChain,
            payload: json!({}),
            sender: sender.into(),
        }
    }

    #[must_use]
    pub fn response_chain(blockchain: &Chain, sender: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::ResponseChain,
            payload: json!({ "blockchain": blockchain }),
            sender: sender.into(),
        }
    }

    #[must_use]
    pub fn ping(sender: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Ping,
            payload: json!({}),
            sender: sender.into(),
        }
    }

    #[must_use]
    pub fn pong(sender: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Pong,
            payload: json!({}),
            sender: sender.into(),
        }
    }

    #[must_use]
    pub fn discover_peers(sender: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::DiscoverPeers,
            payload: json!({}),
            sender: sender.into(),
        }
    }

    #[must_use]
    pub fn peers_list(peers: &[String], sender: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::PeersList,
            payload: json!({ "peers": peers }),
            sender: sender.into(),
        }
    }

    /// Extrai o campo `transaction` do payload de uma `NEW_TRANSACTION`.
    ///
    /// # Errors
    ///
    /// Retorna `PeerProtocolError` se o tipo da mensagem não for
    /// `NewTransaction` ou se o payload não corresponder ao formato
    /// esperado.
    pub fn as_transaction(&self) -> Result<Transaction> {
        self.expect_type(MessageType::NewTransaction)?;
        self.field("transaction")
    }

    /// Extrai o campo `block` do payload de uma `NEW_BLOCK`.
    ///
    /// # Errors
    ///
    /// Ver [`Message::as_transaction`].
    pub fn as_block(&self) -> Result<Block> {
        self.expect_type(MessageType::NewBlock)?;
        self.field("block")
    }

    /// Extrai o campo `blockchain` do payload de uma `RESPONSE_CHAIN`,
    /// contendo tanto a cadeia quanto o mempool do peer.
    ///
    /// # Errors
    ///
    /// Ver [`Message::as_transaction`].
    pub fn as_blockchain(&self) -> Result<Chain> {
        self.expect_type(MessageType::ResponseChain)?;
        self.field("blockchain")
    }

    /// Extrai o campo `peers` do payload de uma `PEERS_LIST`.
    ///
    /// # Errors
    ///
    /// Ver [`Message::as_transaction`].
    pub fn as_peers(&self) -> Result<Vec<String>> {
        self.expect_type(MessageType::PeersList)?;
        self.field("peers")
    }

    fn expect_type(&self, expected: MessageType) -> Result<()> {
        if self.message_type != expected {
            return Err(LedgerError::PeerProtocolError(format!(
                "esperava mensagem do tipo {expected:?}, recebeu {:?}",
                self.message_type
            )));
        }
        Ok(())
    }

    fn field<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.payload.get(name).ok_or_else(|| {
            LedgerError::PeerProtocolError(format!("payload sem campo `{name}`"))
        })?;
        serde_json::from_value(value.clone()).map_err(LedgerError::Serialization)
    }

    /// Serializa a mensagem como JSON prefixado por 4 bytes
    /// big-endian indicando o comprimento do corpo.
    ///
    /// # Errors
    ///
    /// Propaga falhas de serialização do `payload`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(self)?;
        let len = u32::try_from(body.len()).map_err(|_| {
            LedgerError::PeerProtocolError("mensagem excede o limite de tamanho".to_string())
        })?;

        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    /// Lê uma mensagem com prefixo de comprimento de um stream
    /// assíncrono: 4 bytes big-endian de comprimento seguidos do
    /// corpo JSON.
    ///
    /// # Errors
    ///
    /// Retorna `PeerProtocolError` se o comprimento anunciado exceder
    /// [`MAX_MESSAGE_BYTES`], `Io` em falhas de leitura (incluindo EOF
    /// prematuro), e `Serialization` se o corpo não for um `Message`
    /// válido.
    pub async fn decode<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Self> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf);

        if len > MAX_MESSAGE_BYTES {
            return Err(LedgerError::PeerProtocolError(format!(
                "mensagem anunciada de {len} bytes excede o limite de {MAX_MESSAGE_BYTES}"
            )));
        }

        let mut body = vec![0u8; len as usize];
        reader.read_exact(&mut body).await?;

        let message = serde_json::from_slice(&body)?;
        Ok(message)
    }

    /// Escreve a mensagem codificada em um stream assíncrono.
    ///
    /// # Errors
    ///
    /// Propaga falhas de serialização ou de escrita no stream.
    pub async fn write_to<W: AsyncWriteExt + Unpin>(&self, writer: &mut W) -> Result<()> {
        let framed = self.encode()?;
        writer.write_all(&framed).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serializes_as_screaming_snake_case() {
        let value = serde_json::to_value(MessageType::RequestChain).unwrap();
        assert_eq!(value, json!("REQUEST_CHAIN"));
    }

    #[test]
    fn round_trips_a_new_transaction_message() {
        let tx = Transaction::new("alice", "bob", 10.0).unwrap();
        let message = Message::new_transaction(&tx, "node-a");

        let encoded = message.encode().unwrap();
        let len = u32::from_be_bytes(encoded[0..4].try_into().unwrap());
        assert_eq!(len as usize, encoded.len() - 4);

        let decoded: Message = serde_json::from_slice(&encoded[4..]).unwrap();
        let round_tripped = decoded.as_transaction().unwrap();
        assert_eq!(round_tripped, tx);
    }

    #[test]
    fn wrong_accessor_is_a_protocol_error() {
        let message = Message::ping("node-a");
        assert!(message.as_transaction().is_err());
    }

    #[tokio::test]
    async fn decode_reads_exactly_the_framed_message() {
        let tx = Transaction::new("alice", "bob", 10.0).unwrap();
        let message = Message::new_transaction(&tx, "node-a");
        let framed = message.encode().unwrap();

        let mut cursor = std::io::Cursor::new(framed);
        let decoded = Message::decode(&mut cursor).await.unwrap();
        assert_eq!(decoded.as_transaction().unwrap(), tx);
    }

    #[tokio::test]
    async fn decode_rejects_absurd_announced_length() {
        let mut framed = Vec::new();
        framed.extend_from_slice(&(MAX_MESSAGE_BYTES + 1).to_be_bytes());

        let mut cursor = std::io::Cursor::new(framed);
        let result = Message::decode(&mut cursor).await;
        assert!(result.is_err());
    }
}
