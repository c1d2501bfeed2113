use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use zeroize::Zeroizing;

mod auth;
use vaultstream::{KdfParams, Storage, VaultHeader, open_from, seal};

#[derive(Debug, clap::Args)]
struct Argon2Args {
    /// Argon2 memory cost in KiB (default: 65536)
    #[arg(long = "argon-mem")]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: 3)
    #[arg(long = "argon-time")]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: 1)
    #[arg(long = "argon-parallelism")]
    parallelism: Option<u32>,
}

impl Argon2Args {
    fn to_kdf_params(&self) -> anyhow::Result<KdfParams> {
        let default = KdfParams::default();

        KdfParams::new(
            self.mem_cost_kib.unwrap_or(default.mem_cost_kib()),
            self.time_cost.unwrap_or(default.time_cost()),
            self.parallelism.unwrap_or(default.parallelism()),
        )
    }
}

#[derive(Debug, Parser)]
#[command(name = "vaultstream")]
#[command(
    version,
    about = "Streaming encryption and integrity layer for password vault files."
)]
struct Cli {
    /// Log filter, e.g. "debug" or "vaultstream=trace"
    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        env = "VAULTSTREAM_LOG",
        default_value = "warn"
    )]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Seals a plaintext file into a vault
    #[command(arg_required_else_help = true)]
    Seal {
        /// File to seal
        input: PathBuf,
        /// Vault file to write
        output: PathBuf,
        #[command(flatten)]
        argon2: Argon2Args,
    },

    /// Opens a vault and writes the decrypted payload
    #[command(arg_required_else_help = true)]
    Open {
        /// Vault file to open
        input: PathBuf,
        /// File to write the payload to
        output: PathBuf,
    },

    /// Shows header information about a vault without opening it
    #[command(arg_required_else_help = true)]
    Inspect {
        /// Vault file to inspect
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    init_logging(&args.log);

    match args.command {
        Commands::Seal {
            input,
            output,
            argon2,
        } => {
            let kdf = argon2.to_kdf_params()?;
            let password = auth::read_password()?;
            let payload = Zeroizing::new(
                std::fs::read(&input)
                    .with_context(|| format!("failed to read {}", input.display()))?,
            );
            let sealed = seal(&password, kdf, &payload)?;
            Storage::new(output.clone()).save(&sealed)?;
            println!("sealed {} into {}", input.display(), output.display());
        }
        Commands::Open { input, output } => {
            let password = auth::read_password()?;
            let channel = Storage::new(input).read_channel()?;
            let unsealed = open_from(channel, &password)?;
            Storage::new(output.clone()).save(unsealed.payload())?;
            println!("opened vault into {}", output.display());
        }
        Commands::Inspect { input } => {
            let data = Storage::new(input).load()?;
            let (header, _) = VaultHeader::from_bytes(&data)?;
            println!("version:     {}", header.version());
            println!("cipher:      AES-256-CBC");
            println!(
                "kdf:         argon2id (memory {} KiB, time {}, parallelism {})",
                header.kdf().mem_cost_kib(),
                header.kdf().time_cost(),
                header.kdf().parallelism()
            );
            println!("sealed size: {} bytes", data.len());
        }
    }

    Ok(())
}

fn init_logging(filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
