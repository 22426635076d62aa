use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jsonld_seal::{
    config::SealConfig,
    object_store::ObjectStore,
    signer::{load_signer, save_signer, verify, Secp256k1Signer, Signer, SignerType, SigningMode},
    SealOptions, Sealer,
};
use log::info;

/// Seal JSON-LD documents under content identifiers.
#[derive(Parser, Debug)]
#[command(name = "sealctl", version)]
struct Cli {
    /// JSON configuration file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Canonicalize a document and print its CID.
    Seal {
        file: PathBuf,
        /// Persist the sealed object in the configured store.
        #[arg(long)]
        store: bool,
        #[arg(long, requires = "store")]
        owner: Option<String>,
        /// Publish under <owner>/<slug>.
        #[arg(long, requires = "owner")]
        slug: Option<String>,
        /// Key file written by `keygen`; signs the canonical form.
        #[arg(long, requires = "store")]
        signer: Option<PathBuf>,
        /// Sign as an Ethereum personal message.
        #[arg(long, requires = "signer")]
        personal: bool,
    },
    /// Print a stored document.
    Get {
        cid: String,
        /// Print the canonical N-Quads instead.
        #[arg(long)]
        canonical: bool,
    },
    /// Remove a stored document.
    Delete { cid: String },
    /// List the versions published under <owner>/<slug>.
    History { owner: String, slug: String },
    /// Create a secp256k1 key file.
    Keygen { dir: PathBuf, name: String },
    /// Check a signature over the canonical form of a document.
    Verify {
        file: PathBuf,
        signature: String,
        address: String,
        #[arg(long)]
        personal: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SealConfig::from_file(path)?,
        None => SealConfig::default(),
    };

    match cli.command {
        Commands::Seal {
            file,
            store,
            owner,
            slug,
            signer,
            personal,
        } => {
            let raw = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let sealer = Sealer::from_config(&config)?;

            if !store {
                let sealed = sealer.seal(&raw).await?;
                println!("{}", sealed.cid);
                return Ok(());
            }

            let signer = signer.map(load_signer).transpose()?;
            let mut object_store = config.local_store();
            object_store.init().await?;

            let receipt = sealer
                .seal_and_store(
                    &object_store,
                    &raw,
                    SealOptions {
                        owner: owner.as_deref(),
                        slug: slug.as_deref(),
                        signer: signer.as_ref().map(|s| s as &dyn Signer),
                        mode: SigningMode::from_personal_sign(personal),
                    },
                )
                .await?;

            if let Some(signature) = &receipt.signature {
                info!("signed by {}", signature.signer_address);
            }
            println!("{}", receipt.cid);
        }
        Commands::Get { cid, canonical } => {
            let store = config.local_store();
            let bytes = if canonical {
                store.get_canonical(&cid).await?
            } else {
                store.get(&cid).await?
            };
            println!("{}", String::from_utf8_lossy(&bytes));
        }
        Commands::Delete { cid } => {
            config.local_store().delete(&cid).await?;
            info!("deleted {cid}");
        }
        Commands::History { owner, slug } => {
            for entry in config.local_store().read_history(&owner, &slug).await? {
                println!("{}\t{}", entry.created_at.to_rfc3339(), entry.cid);
            }
        }
        Commands::Keygen { dir, name } => {
            fs::create_dir_all(&dir)?;
            let signer = SignerType::SECP256K1(Secp256k1Signer::create()?);
            save_signer(&signer, dir, &name)?;
            println!("{}", signer.address());
        }
        Commands::Verify {
            file,
            signature,
            address,
            personal,
        } => {
            let raw = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let sealed = Sealer::from_config(&config)?.seal(&raw).await?;

            let mode = SigningMode::from_personal_sign(personal);
            if !verify(sealed.canonical.as_bytes(), &signature, &address, mode)? {
                bail!("signature does not match {address} for {}", sealed.cid);
            }
            println!("ok {}", sealed.cid);
        }
    }

    Ok(())
}
