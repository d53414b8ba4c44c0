use std::{
    fs,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use airdrop_portal::{balances::SnapshotBalances, config::PortalConfig, sweep::run_sweep};
use anyhow::Context;
use clap::{Parser, Subcommand};
use portal_core::{
    boost::{self, calculate_boost, TokenBalances},
    oauth::{PkcePair, StateClaims, StateSigner, StateVerifier, PKCE_METHOD},
    Address, U256,
};
use portal_store::{Platform, Store};
use serde::Serialize;

//==================== CLI ====================//

#[derive(Parser)]
#[command(
    name = "portal",
    version,
    about = "Airdrop portal: social verification, referral joins and token-balance boosts"
)]
struct Cli {
    /// JSON config file (all fields optional)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `database_url` from the config file
    #[arg(long, global = true, env = "PORTAL_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and apply the schema
    InitDb,
    /// Register a wallet on first contact
    Touch { address: Address },
    /// Mark the Twitter/X track as verified
    VerifyTwitter {
        address: Address,
        #[arg(long)]
        account: String,
    },
    /// Mark the Telegram track as verified
    VerifyTelegram {
        address: Address,
        #[arg(long)]
        account: String,
    },
    /// Show verification and referral state
    Progress { address: Address },
    /// List the users referred by an address
    Referrals { address: Address },
    /// Redeem a referral code for a (possibly new) address
    Join {
        address: Address,
        #[arg(long)]
        code: String,
    },
    /// Compute (and store) the boost for explicit balances
    Boost {
        address: Address,
        #[arg(long, default_value = "0", value_parser = boost::parse_decimal)]
        token_a: U256,
        #[arg(long, default_value = "0", value_parser = boost::parse_decimal)]
        token_b: U256,
        #[arg(long, default_value = "0", value_parser = boost::parse_decimal)]
        token_c: U256,
        /// Print the outcome without persisting it
        #[arg(long)]
        dry_run: bool,
    },
    /// Refresh every user's boost from a JSONL balance snapshot
    Sweep {
        #[arg(long)]
        balances: PathBuf,
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Dump every user as JSONL
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate the Ed25519 key pair used to sign OAuth state
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Issue a signed OAuth state and a PKCE pair for an address
    OauthStart {
        address: Address,
        #[arg(long, default_value = "twitter")]
        provider: String,
        /// Hex file with the 32-byte state signing key
        #[arg(long)]
        sk_file: PathBuf,
    },
    /// Validate an OAuth state returned by the provider
    OauthCheck {
        state: String,
        /// Hex file with the 32-byte state verifying key
        #[arg(long)]
        pk_file: PathBuf,
    },
}

#[derive(Serialize)]
struct OauthStart {
    state: String,
    code_verifier: String,
    code_challenge: String,
    code_challenge_method: &'static str,
}

//==================== helpers ====================//

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_all(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("mkdir {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

fn read_hex_key(path: &Path) -> anyhow::Result<Vec<u8>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    hex::decode(raw.trim()).with_context(|| format!("{} is not hex", path.display()))
}

fn unix_now() -> anyhow::Result<i64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before unix epoch")?;
    Ok(elapsed.as_secs() as i64)
}

//==================== commands without a database ====================//

fn keygen_cmd(out_dir: &Path) -> anyhow::Result<()> {
    let signer = StateSigner::generate();
    write_all(
        &out_dir.join("state_sk.hex"),
        hex::encode(signer.to_bytes()).as_bytes(),
    )?;
    write_all(
        &out_dir.join("state_pk.hex"),
        hex::encode(signer.verifier().to_bytes()).as_bytes(),
    )?;
    log::info!("state key pair written to {}", out_dir.display());
    Ok(())
}

fn oauth_start_cmd(address: Address, provider: String, sk_file: &Path) -> anyhow::Result<()> {
    let signer = StateSigner::from_bytes(&read_hex_key(sk_file)?)?;
    let claims = StateClaims::new(address, provider, unix_now()?);
    let pkce = PkcePair::generate();
    print_json(&OauthStart {
        state: signer.issue(&claims)?,
        code_verifier: pkce.verifier,
        code_challenge: pkce.challenge,
        code_challenge_method: PKCE_METHOD,
    })
}

fn oauth_check_cmd(state: &str, pk_file: &Path, max_age_secs: i64) -> anyhow::Result<()> {
    let verifier = StateVerifier::from_bytes(&read_hex_key(pk_file)?)?;
    let claims = verifier.verify(state, unix_now()?, max_age_secs)?;
    print_json(&claims)
}

//==================== commands against the store ====================//

async fn open_store(config: &PortalConfig) -> anyhow::Result<Store> {
    Store::connect(&config.database_url)
        .await
        .with_context(|| format!("open database {}", config.database_url))
}

async fn boost_cmd(
    store: &Store,
    config: &PortalConfig,
    address: &Address,
    balances: TokenBalances,
    dry_run: bool,
) -> anyhow::Result<()> {
    let outcome = calculate_boost(&config.boost, &balances);
    if dry_run {
        return print_json(&outcome);
    }
    print_json(&store.save_boost(address, &balances, &outcome).await?)
}

async fn sweep_cmd(
    store: &Store,
    config: &PortalConfig,
    balances: &Path,
    concurrency: Option<usize>,
) -> anyhow::Result<()> {
    let snapshot = SnapshotBalances::from_jsonl_file(balances)?;
    log::info!(
        "loaded {} balance entries from {}",
        snapshot.len(),
        balances.display()
    );
    let report = run_sweep(
        store,
        Arc::new(snapshot),
        Arc::new(config.boost.clone()),
        concurrency.unwrap_or(config.sweep_concurrency),
    )
    .await?;
    print_json(&report)
}

async fn export_cmd(store: &Store, out: Option<&Path>) -> anyhow::Result<()> {
    let rows = store.export().await?;
    let sink: Box<dyn Write> = match out {
        Some(path) => Box::new(
            fs::File::create(path).with_context(|| format!("create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut sink = BufWriter::new(sink);
    for row in &rows {
        serde_json::to_writer(&mut sink, row)?;
        sink.write_all(b"\n")?;
    }
    sink.flush()?;
    if let Some(path) = out {
        log::info!("exported {} users to {}", rows.len(), path.display());
    }
    Ok(())
}

//==================== main ====================//

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = PortalConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command {
        Command::InitDb => {
            open_store(&config).await?;
            log::info!("schema ready at {}", config.database_url);
            Ok(())
        }
        Command::Touch { address } => {
            let store = open_store(&config).await?;
            store.touch_user(&address).await?;
            print_json(&store.progress(&address).await?)
        }
        Command::VerifyTwitter { address, account } => {
            let store = open_store(&config).await?;
            print_json(&store.verify_social(&address, Platform::Twitter, &account).await?)
        }
        Command::VerifyTelegram { address, account } => {
            let store = open_store(&config).await?;
            print_json(&store.verify_social(&address, Platform::Telegram, &account).await?)
        }
        Command::Progress { address } => {
            let store = open_store(&config).await?;
            match store.progress(&address).await? {
                Some(progress) => print_json(&progress),
                None => anyhow::bail!("unknown address {address}"),
            }
        }
        Command::Referrals { address } => {
            let store = open_store(&config).await?;
            print_json(&store.referrals_of(&address).await?)
        }
        Command::Join { address, code } => {
            let store = open_store(&config).await?;
            print_json(&store.join_referral(&code, &address).await?)
        }
        Command::Boost {
            address,
            token_a,
            token_b,
            token_c,
            dry_run,
        } => {
            let store = open_store(&config).await?;
            let balances = TokenBalances::new(token_a, token_b, token_c);
            boost_cmd(&store, &config, &address, balances, dry_run).await
        }
        Command::Sweep {
            balances,
            concurrency,
        } => {
            let store = open_store(&config).await?;
            sweep_cmd(&store, &config, &balances, concurrency).await
        }
        Command::Export { out } => {
            let store = open_store(&config).await?;
            export_cmd(&store, out.as_deref()).await
        }
        Command::Keygen { out_dir } => keygen_cmd(&out_dir),
        Command::OauthStart {
            address,
            provider,
            sk_file,
        } => oauth_start_cmd(address, provider, &sk_file),
        Command::OauthCheck { state, pk_file } => {
            oauth_check_cmd(&state, &pk_file, config.oauth_state_max_age_secs)
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(2);
    }
}
