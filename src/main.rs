use clap::{Args, Parser, Subcommand};
use ledger_core::Node;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "blockchain-lsd")]
#[command(about = "Nó de um ledger distribuído didático com prova de trabalho")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inicia um nó, conecta aos bootstraps informados e permanece em execução.
    StartNode(StartNodeArgs),
    /// Mostra informações de versão.
    Version,
}

#[derive(Args)]
struct StartNodeArgs {
    /// Endereço de escuta no formato host:port.
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    address: String,

    /// Peers conhecidos de partida, no formato host:port.
    #[arg(short, long)]
    bootstrap: Vec<String>,

    /// Endereço de recompensa usado ao minerar.
    #[arg(short, long, default_value = "miner")]
    miner_address: String,

    /// Se definido, mina continuamente em segundo plano.
    #[arg(long)]
    mine: bool,

    /// Nível de log (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ledger_shared::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::StartNode(args) => start_node(args).await,
        Commands::Version => {
            show_version();
            Ok(())
        }
    }
}

async fn start_node(args: &StartNodeArgs) -> ledger_shared::Result<()> {
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    info!(address = %args.address, "iniciando nó");
    let node = Node::new(args.address.clone());
    node.start().await?;

    for peer in &args.bootstrap {
        node.connect_to_peer(peer).await;
    }
    if !args.bootstrap.is_empty() {
        node.sync_blockchain().await;
    }

    if args.mine {
        let miner_address = args.miner_address.clone();
        let chain_probe = node.snapshot_chain().await;
        info!(height = chain_probe.chain.len(), "cadeia inicial carregada");
        loop {
            match node.mine().await {
                Some(block) => info!(index = block.index, hash = %block.hash, "bloco minerado e transmitido"),
                None => warn!("mineração não produziu bloco (mempool vazio ou cancelada)"),
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    }

    // Mantém o processo vivo para aceitar conexões de peers até ser interrompido.
    tokio::signal::ctrl_c()
        .await
        .map_err(ledger_shared::LedgerError::Io)?;
    node.stop().await;
    Ok(())
}

fn show_version() {
    println!("blockchain-lsd {}", env!("CARGO_PKG_VERSION"));
    println!("ledger distribuído didático: PoW + gossip sobre TCP");
}
