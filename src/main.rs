use chordring::{
    chord::{node::Membership, types::Key, types::Value, ChordConfig},
    network::{
        grpc::{client::GrpcTransport, PeerConfig},
        node::ChordPeer,
        transport::ChordTransport,
    },
};
use clap::{Args, Parser, Subcommand};
use log::{error, info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(name = "chordring")]
#[command(about = "A Chord distributed hash table")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// JSON file with protocol settings
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,
    /// Identifier bits (m); overrides the config file
    #[arg(long = "bits", global = true)]
    bits: Option<u32>,
    /// Stabilization period in milliseconds; overrides the config file
    #[arg(long = "stabilize-ms", global = true)]
    stabilize_ms: Option<u64>,
    /// Console log level
    #[arg(long = "log-level", default_value = "info", global = true)]
    log_level: String,
    /// log4rs YAML file; replaces the console logger
    #[arg(long = "log-config", global = true)]
    log_config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new bootstrap node (first node in the network)
    #[command(name = "start-bootstrap")]
    StartBootstrap {
        /// Optional gRPC port (random if not specified)
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,
        /// Host to bind and advertise
        #[arg(long = "bind", default_value = "127.0.0.1")]
        bind: String,
    },
    /// Join an existing Chord network through a bootstrap node
    #[command(name = "join")]
    Join {
        /// Local gRPC port for this node (random if not specified)
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,
        /// Port of the bootstrap node to connect to
        #[arg(short = 'b', long = "bootstrap-port")]
        bootstrap_port: u16,
        /// Bootstrap node host (default: 127.0.0.1)
        #[arg(short = 'n', long = "host", default_value = "127.0.0.1")]
        host: String,
        /// Host to bind and advertise
        #[arg(long = "bind", default_value = "127.0.0.1")]
        bind: String,
    },
    /// Print the node responsible for a key
    Lookup {
        /// Any ring member, as host:port
        #[arg(long = "node")]
        node: String,
        key: String,
    },
    /// Fetch a key's value from the ring
    Get {
        #[arg(long = "node")]
        node: String,
        key: String,
    },
    /// Store a value in the ring
    Put {
        #[arg(long = "node")]
        node: String,
        key: String,
        value: String,
    },
}

fn init_logging(args: &CommonArgs) -> Result<(), String> {
    if let Some(path) = &args.log_config {
        return log4rs::init_file(path, Default::default())
            .map_err(|e| format!("Failed to load log config {}: {}", path.display(), e));
    }

    let level = LevelFilter::from_str(&args.log_level)
        .map_err(|_| format!("Unknown log level: {}", args.log_level))?;
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l:<5})} {t} - {m}{n}",
        )))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .map_err(|e| format!("Invalid log config: {}", e))?;
    log4rs::init_config(config).map_err(|e| format!("Failed to initialise logging: {}", e))?;
    Ok(())
}

fn load_config(args: &CommonArgs) -> Result<ChordConfig, String> {
    let mut config = match &args.config {
        Some(path) => ChordConfig::from_file(path).map_err(|e| e.to_string())?,
        None => ChordConfig::default(),
    };
    if let Some(bits) = args.bits {
        config.id_bits = bits;
    }
    if let Some(ms) = args.stabilize_ms {
        config.stabilize_interval_ms = ms;
    }
    config.space().map_err(|e| e.to_string())?;
    Ok(config)
}

async fn run_node(
    host: String,
    port: Option<u16>,
    config: ChordConfig,
    membership: Membership,
) -> Result<(), String> {
    let mut peer = ChordPeer::new(PeerConfig {
        host,
        grpc_port: port,
        chord: config,
    })
    .await
    .map_err(|e| format!("Failed to create peer: {}", e))?;

    info!(
        "Node {} listening on port {}",
        peer.node().descriptor(),
        peer.get_port()
    );

    if let Err(e) = peer.start(membership).await {
        error!("Failed to start node: {}", e);
        return Err(format!("Failed to start node: {}", e));
    }
    info!(
        "Other nodes can join using: chordring join -b {}",
        peer.get_port()
    );

    if let Err(e) = peer.run().await {
        error!("Node error: {}", e);
        return Err(format!("Node error: {}", e));
    }
    info!("Node shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();
    init_logging(&cli.common)?;
    let config = load_config(&cli.common)?;
    let space = config.space().map_err(|e| e.to_string())?;
    let transport = GrpcTransport::new(config.rpc_timeout());

    match cli.command {
        Commands::StartBootstrap { port, bind } => {
            info!("Initializing bootstrap node...");
            run_node(bind, port, config, Membership::Bootstrap).await
        }
        Commands::Join {
            port,
            bootstrap_port,
            host,
            bind,
        } => {
            info!("Initializing node to join network...");
            let via = format!("{}:{}", host, bootstrap_port);
            run_node(bind, port, config, Membership::Join { via }).await
        }
        Commands::Lookup { node, key } => {
            let id = space.hash(key.as_bytes());
            let owner = transport
                .find_successor(&node, id)
                .await
                .map_err(|e| format!("Lookup failed: {}", e))?;
            println!("{} -> {} (key id {})", key, owner, id);
            Ok(())
        }
        Commands::Get { node, key } => {
            let key = Key::from(key.as_str());
            let owner = transport
                .find_successor(&node, space.hash(&key.0))
                .await
                .map_err(|e| format!("Lookup failed: {}", e))?;
            match transport
                .get_key(&owner.address, &key)
                .await
                .map_err(|e| format!("Get failed: {}", e))?
            {
                Some(value) => println!("{}", String::from_utf8_lossy(&value.0)),
                None => println!("Key not found (owner {})", owner),
            }
            Ok(())
        }
        Commands::Put { node, key, value } => {
            let key = Key::from(key.as_str());
            let owner = transport
                .find_successor(&node, space.hash(&key.0))
                .await
                .map_err(|e| format!("Lookup failed: {}", e))?;
            transport
                .put_key(&owner.address, key, Value::from(value.as_str()))
                .await
                .map_err(|e| format!("Put failed: {}", e))?;
            println!("Stored at {}", owner);
            Ok(())
        }
    }
}
