pub mod block;
pub mod canonical;
pub mod chain;
pub mod miner;
pub mod node;
pub mod protocol;
pub mod transaction;

pub use block::Block;
pub use chain::Chain;
pub use miner::Miner;
pub use node::Node;
pub use protocol::{Message, MessageType};
pub use transaction::Transaction;
