use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use proofchain_core::{
    constants::DEFAULT_SECRET, mine::solve_proof, Challenge, DigestEncoding, HashAlgorithm,
    Hasher,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const API_BASE: &str = "/api/v1";

#[derive(Parser, Debug)]
#[command(name = "proofchain-cli")]
#[command(about = "CLI client and miner for a proofchain node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, env = "NODE_URL", default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List mined blocks with their owners
    Blocks,
    /// Show one block
    Block { index: u64 },
    /// List every known node and its wallet
    Wallets,
    /// Show the blocks a node holds
    Wallet { address: String },
    /// List transactions, optionally for one node
    Transactions { address: Option<String> },
    /// Show the current proof target
    Challenge,
    /// Search for proofs and submit them as `address`
    Mine {
        address: String,
        /// Blocks to mine before exiting
        #[arg(long, default_value_t = 1)]
        count: u32,
        /// JSON payload stored in each mined block
        #[arg(long, default_value = "{}", value_parser = parse_json)]
        data: Value,
        #[command(flatten)]
        hash: HashArgs,
    },
    /// Transfer a block between two registered nodes
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        index: u64,
    },
}

/// Must match the node's hashing settings or no proof will be accepted.
#[derive(Args, Debug)]
struct HashArgs {
    #[arg(long, env = "HASH_TYPE", default_value = "sha256")]
    hash_algorithm: HashAlgorithm,
    #[arg(long, env = "CRYPTO_SECRET", default_value = DEFAULT_SECRET, hide_env_values = true)]
    secret: String,
    #[arg(long, env = "DIGEST", default_value = "hex")]
    encoding: DigestEncoding,
}

impl HashArgs {
    fn hasher(&self) -> Hasher {
        Hasher::new(self.hash_algorithm, &self.secret, self.encoding)
    }
}

#[derive(Serialize)]
struct TransferIn {
    sender: String,
    recipient: String,
    index: u64,
}

fn parse_json(raw: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(raw)
}

fn endpoint(node: &str, path: &str) -> String {
    format!("{}{API_BASE}{path}", node.trim_end_matches('/'))
}

struct NodeClient {
    http: reqwest::Client,
    node: String,
}

impl NodeClient {
    fn new(node: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            node,
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let res = self.http.get(endpoint(&self.node, path)).send().await?;
        Self::read(res).await
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value> {
        let res = self
            .http
            .post(endpoint(&self.node, path))
            .json(body)
            .send()
            .await?;
        Self::read(res).await
    }

    async fn read(res: reqwest::Response) -> Result<Value> {
        let status = res.status();
        let body: Value = res.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = body["error"].as_str().unwrap_or("no details");
            bail!("node answered {status}: {message}");
        }
        Ok(body)
    }

    async fn challenge(&self) -> Result<Challenge> {
        let body = self.get("/challenge").await?;
        serde_json::from_value(body).context("decoding challenge")
    }
}

async fn mine(client: &NodeClient, address: &str, count: u32, data: Value, hasher: Hasher) -> Result<()> {
    let mut mined = 0;
    while mined < count {
        let challenge = client.challenge().await?;
        info!(
            index = challenge.index,
            target = %challenge.resolution_hash,
            "searching for proof"
        );
        let search = hasher.clone();
        let target = challenge.clone();
        let solution = tokio::task::spawn_blocking(move || {
            solve_proof(&search, &target.last_proof, &target.resolution_hash, 0..u64::MAX)
        })
        .await?
        .context("proof search exhausted the counter range")?;

        let body = json!({ "proof": solution.proof, "node": address, "data": data });
        match client.post("/validate", &body).await {
            Ok(accepted) => {
                mined += 1;
                println!("{}", serde_json::to_string_pretty(&accepted["block"])?);
            }
            // Another miner may have extended the chain first.
            Err(err) => warn!("proof for block {} rejected: {err:#}", challenge.index),
        }
    }
    Ok(())
}

fn print(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = NodeClient::new(cli.node);
    match cli.cmd {
        Command::Blocks => print(&client.get("/blocks").await?)?,
        Command::Block { index } => print(&client.get(&format!("/blocks/{index}")).await?)?,
        Command::Wallets => print(&client.get("/wallets").await?)?,
        Command::Wallet { address } => print(&client.get(&format!("/wallets/{address}")).await?)?,
        Command::Transactions { address: None } => print(&client.get("/transactions").await?)?,
        Command::Transactions {
            address: Some(address),
        } => print(&client.get(&format!("/transactions/{address}")).await?)?,
        Command::Challenge => {
            let challenge = client.challenge().await?;
            print(&serde_json::to_value(challenge)?)?
        }
        Command::Mine {
            address,
            count,
            data,
            hash,
        } => mine(&client, &address, count, data, hash.hasher()).await?,
        Command::Transfer { from, to, index } => {
            let transfer = TransferIn {
                sender: from,
                recipient: to,
                index,
            };
            print(&client.post("/transactions", &transfer).await?)?
        }
    }
    Ok(())
}
