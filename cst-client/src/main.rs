//! CST (Chain Stamp Trees) CLI client

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use cst_client::{leaf_hash, load_timestamp_proof, timestamp_proof, NotaryClient, ProofStorage, RpcChainClient};
use cst_core::verify_leaf;
use cst_types::{Digest, ProofStatus, SerializedProof, StampRequest, TimestampProof};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cst")]
#[command(about = "CST (Chain Stamp Trees) timestamp client", long_about = None)]
struct Cli {
    /// Notary server URL
    #[arg(short, long, default_value = "http://localhost:8080")]
    server: String,

    /// Chain node RPC URL used for verification
    #[arg(short, long, default_value = "http://localhost:8732")]
    rpc: String,

    /// Storage directory
    #[arg(short = 'd', long, default_value = ".cst")]
    storage_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the leaf hash of a file
    Hash {
        file: PathBuf,
    },

    /// Submit a file (or a hex hash) to the notary
    Stamp {
        /// File to stamp
        file: Option<PathBuf>,

        /// Leaf hash in hex, instead of a file
        #[arg(long, conflicts_with = "file")]
        hash: Option<String>,

        /// Identifier the notary archives the proof under
        #[arg(long)]
        file_id: Option<String>,

        /// URL notified with the proof once committed (repeatable)
        #[arg(long = "webhook")]
        webhooks: Vec<String>,
    },

    /// Ask the notary for a hash's state, storing the proof once committed
    Status {
        /// Leaf hash in hex
        hash: String,
    },

    /// Ask the notary to commit its queue now
    Commit,

    /// Verify a proof against the chain node
    Verify {
        /// Proof JSON file, or the hex leaf hash of a stored proof
        input: String,

        /// Also check that the proof starts at this file's leaf hash
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print the block hash a proof derives, without contacting a node
    Derive {
        /// Proof JSON file
        proof: PathBuf,
    },

    /// List all stored proofs
    List,

    /// Show details of a stored proof
    Show {
        /// Leaf hash in hex
        digest: String,
    },

    /// Export a stored proof as JSON
    Export {
        /// Leaf hash in hex
        digest: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a proof from JSON
    Import {
        /// Input JSON file
        file: PathBuf,
    },

    /// Check server health
    Health,
}

fn parse_hash(input: &str) -> Result<Digest> {
    Digest::from_hex(input).map_err(|e| anyhow!("Invalid leaf hash {}: {}", input, e))
}

/// A proof from a file path, or from local storage by leaf hash
fn resolve_proof(storage: &ProofStorage, input: &str) -> Result<TimestampProof> {
    let path = Path::new(input);
    let json = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        let digest = parse_hash(input)?;
        storage.export_json(&digest)?
    };
    Ok(load_timestamp_proof(&json)?)
}

fn print_proof(proof: &TimestampProof) {
    println!("Leaf:       {}", hex::encode(proof.start()));
    println!("Block:      {}", proof.block_hash());
    if let Some(level) = proof.level {
        println!("Level:      {}", level);
    }
    println!("Network:    {}", proof.network);
    println!("Timestamp:  {}", proof.timestamp);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let client = NotaryClient::new(cli.server.clone());
    let storage = ProofStorage::open(&cli.storage_dir)?;

    match cli.command {
        Commands::Hash { file } => {
            let data = std::fs::read(&file)?;
            println!("{}", leaf_hash(&data));
        }

        Commands::Stamp {
            file,
            hash,
            file_id,
            webhooks,
        } => {
            let hash = match (file, hash) {
                (Some(file), None) => leaf_hash(&std::fs::read(&file)?),
                (None, Some(hash)) => parse_hash(&hash)?,
                _ => bail!("Pass either a file or --hash"),
            };
            let request = StampRequest {
                hash,
                file_id,
                webhooks,
            };
            let response = client.stamp(&request).await?;

            match response.proof.proof {
                Some(proof) => {
                    storage.store(&hash, &proof)?;
                    println!("Already committed, proof stored");
                }
                None => println!("Queued for the next commit"),
            }
            println!("Hash: {}", hash);
        }

        Commands::Status { hash } => {
            let hash = parse_hash(&hash)?;
            let state = client
                .state(&hash)
                .await?
                .ok_or_else(|| anyhow!("The notary does not know {}", hash))?;

            match (state.proof.status, state.proof.proof) {
                (ProofStatus::Committed, Some(proof)) => {
                    storage.store(&hash, &proof)?;
                    println!("Status:     committed");
                    print_proof(&timestamp_proof(proof)?);
                }
                _ => println!("Status:     pending"),
            }
            if let Some(file) = state.file {
                println!("Archived:   {} ({} bytes)", file.file.filename, file.metadata.size);
            }
        }

        Commands::Commit => {
            let summary = client.commit().await?;
            if summary.success == 0 {
                println!("Nothing to commit");
            } else {
                println!("Committed {} proofs", summary.success);
                if let Some(operation) = summary.operation {
                    println!("Operation:  {}", operation);
                }
                if let (Some(block), Some(level)) = (summary.block_hash, summary.level) {
                    println!("Block:      {} (level {})", block, level);
                }
            }
        }

        Commands::Verify { input, file } => {
            let proof = resolve_proof(&storage, &input)?;
            if let Some(file) = file {
                verify_leaf(&proof, &leaf_hash(&std::fs::read(&file)?))?;
            }

            let node = RpcChainClient::new(&cli.rpc)?;
            let header = client.verify(&proof, &node).await?;

            println!("Proof verified successfully");
            print_proof(&proof);
            println!("Node level: {}", header.level);
        }

        Commands::Derive { proof } => {
            let proof = load_timestamp_proof(&std::fs::read_to_string(&proof)?)?;
            println!("Derivation: {}", hex::encode(proof.derivation()));
            print_proof(&proof);
        }

        Commands::List => {
            let proofs = storage.list()?;

            if proofs.is_empty() {
                println!("No stored proofs");
            } else {
                println!("Stored proofs ({})", proofs.len());
                println!();
                for (digest, proof) in proofs {
                    println!("Leaf:       {}", digest);
                    if let Some(timestamp) = proof.timestamp {
                        println!("Timestamp:  {}", timestamp);
                    }
                    println!();
                }
            }
        }

        Commands::Show { digest } => {
            let digest = parse_hash(&digest)?;
            let serialized: SerializedProof = storage
                .get(&digest)?
                .ok_or_else(|| anyhow!("No proof found for {}", digest))?;
            let version = serialized.version;
            let proof = timestamp_proof(serialized)?;

            println!("Timestamp Proof");
            println!("===============");
            print_proof(&proof);
            println!("Operations: {}", proof.proof.operations.len());
            println!("Version:    {}", version);
        }

        Commands::Export { digest, output } => {
            let digest = parse_hash(&digest)?;
            let json = storage.export_json(&digest)?;

            if let Some(output_path) = output {
                std::fs::write(&output_path, json)?;
                println!("Proof exported to {}", output_path.display());
            } else {
                println!("{}", json);
            }
        }

        Commands::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let digest = storage.import_json(&json)?;

            println!("Proof imported successfully");
            println!("Leaf: {}", digest);
        }

        Commands::Health => {
            let health = client.health().await?;
            println!("Server Health");
            println!("=============");
            println!("Status:       {}", health.status);
            println!("Commit state: {}", health.commit_state);
            println!("Queued:       {}", health.queued);
        }
    }

    Ok(())
}
