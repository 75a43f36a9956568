//! kvlink Frame Tool
//!
//! Encodes sample request frames and decodes response frames given as hex.

use clap::{Parser, Subcommand};
use kvlink::protocol::{
    self, ChannelContext, CollectionId, Counter, DocKey, Frame, KvOperation, Opcode,
};
use kvlink::{Config, KvError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// kvlink frame tool
#[derive(Parser, Debug)]
#[command(name = "kvlink-frame")]
#[command(about = "Encode and inspect key-value protocol frames")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encode an increment request
    EncodeIncrement {
        /// Document id
        #[arg(short, long)]
        key: String,

        /// Amount to add
        #[arg(short, long, default_value = "1")]
        delta: i64,

        /// Value to create the counter with if it does not exist
        #[arg(short, long)]
        initial: Option<i64>,

        /// Expiry in seconds when the counter is created
        #[arg(short, long, default_value = "0")]
        expiry: u32,

        /// Collection id; enables collection-qualified keys
        #[arg(short, long)]
        collection_id: Option<u32>,

        /// Opaque correlation value
        #[arg(short, long, default_value = "1")]
        opaque: u32,
    },

    /// Encode a metadata probe
    EncodeGetMeta {
        /// Document id
        #[arg(short, long)]
        key: String,

        /// Collection id; enables collection-qualified keys
        #[arg(short, long)]
        collection_id: Option<u32>,
    },

    /// Decode a response frame
    Decode {
        /// Frame bytes as hex
        hex: String,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kvlink=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Commands::EncodeIncrement {
            key,
            delta,
            initial,
            expiry,
            collection_id,
            opaque,
        } => Counter::new(delta, initial, expiry).and_then(|counter| {
            let key = doc_key(&key, collection_id)?;
            encode(KvOperation::increment(key, counter), opaque, collection_id, &config)
        }),
        Commands::EncodeGetMeta { key, collection_id } => doc_key(&key, collection_id)
            .and_then(|key| encode(KvOperation::get_meta(key), 1, collection_id, &config)),
        Commands::Decode { hex } => decode(&hex),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn doc_key(id: &str, collection_id: Option<u32>) -> Result<DocKey> {
    let key = DocKey::new(id)?;
    Ok(match collection_id {
        Some(id) => key.in_collection(CollectionId(id)),
        None => key,
    })
}

fn encode(mut op: KvOperation, opaque: u32, collection_id: Option<u32>, config: &Config) -> Result<()> {
    op.route(config.num_partitions);
    let channel = ChannelContext::new(config.bucket.clone()).with_collections(collection_id.is_some());
    let frame = protocol::encode(&op, opaque, &channel);

    tracing::info!(
        operation = op.name(),
        partition = op.key().partition(),
        bytes = frame.len(),
        "encoded request"
    );
    println!("{}", hex::encode(&frame));
    Ok(())
}

fn decode(text: &str) -> Result<()> {
    let bytes = from_hex(text)?;
    let frame = Frame::parse(&bytes)?;
    let header = frame.header;

    let opcode = Opcode::from_u8(header.opcode)
        .map(|op| format!("{:?}", op))
        .unwrap_or_else(|| "Unknown".to_string());

    println!("magic:    0x{:02x}", header.magic);
    println!("opcode:   0x{:02x} ({})", header.opcode, opcode);
    if header.is_response() {
        println!("status:   0x{:04x} ({:?})", header.partition_or_status, header.status());
    } else {
        println!("partition: {}", header.partition_or_status);
    }
    println!("datatype: 0x{:02x}", header.datatype);
    println!("extras:   {} [{}]", header.extras_len, hex::encode(frame.extras));
    println!("key:      {} [{}]", header.key_len, hex::encode(frame.key));
    println!("value:    {} [{}]", header.value_len(), hex::encode(frame.value));
    println!("opaque:   {}", header.opaque);
    println!("cas:      {}", header.cas);
    Ok(())
}

fn from_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    hex::decode(digits).map_err(|e| KvError::InvalidArgument(format!("Invalid hex input: {}", e)))
}
