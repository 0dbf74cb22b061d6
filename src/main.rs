use facegate::{
    core::{HttpLivenessGate, OnnxFaceLocalizer, OnnxFeatureExtractor},
    Config, CryptoEnvelope, EncryptedBiometricStore, FaceGateService, VerifyOutcome,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Face authentication with encrypted biometric storage")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "configs/facegate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new identity from an image file
    Register {
        #[arg(short, long)]
        username: String,
        /// Image file with the face to enroll
        image: PathBuf,
    },
    /// Verify a face against the enrolled identities
    Verify {
        image: PathBuf,
    },
    /// Check whether a username is already enrolled
    CheckUsername {
        #[arg(short, long)]
        username: String,
    },
    /// Check whether a face is already enrolled (loose tolerance)
    CheckFace {
        image: PathBuf,
    },
    /// Record a malicious-attack diagnostic, optionally with evidence
    RecordAttack {
        #[arg(short, long)]
        info: String,
        image: Option<PathBuf>,
    },
    /// List recorded unauthorized probes
    ListUnauthorized,
}

fn build_service(config: Config) -> Result<FaceGateService> {
    let crypto = Arc::new(CryptoEnvelope::load_or_generate(&config.storage.key_path)?);
    let store = Arc::new(EncryptedBiometricStore::open(&config.storage.db_path)?);
    let localizer = Box::new(OnnxFaceLocalizer::new(&config)?);
    let extractor = Box::new(OnnxFeatureExtractor::new(&config)?);
    let liveness = Box::new(HttpLivenessGate::new(&config.liveness));

    Ok(FaceGateService::new(
        config, store, crypto, localizer, extractor, liveness,
    )?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load_from_path(&cli.config)?;
    let service = build_service(config)?;

    match cli.command {
        Commands::Register { username, image } => {
            let bytes = std::fs::read(&image)?;
            service.register(&username, &bytes)?;
            println!("Registered {}", username);
        }
        Commands::Verify { image } => {
            let bytes = std::fs::read(&image)?;
            match service.verify(&bytes) {
                VerifyOutcome::Accepted { username, distance } => {
                    println!("Accepted: {} (distance {:.4})", username, distance);
                }
                VerifyOutcome::Rejected { reason, distance } => match distance {
                    Some(d) => println!("Rejected: {:?} (distance {:.4})", reason, d),
                    None => println!("Rejected: {:?}", reason),
                },
            }
        }
        Commands::CheckUsername { username } => {
            let exists = service.username_exists(&username)?;
            println!("{}", if exists { "taken" } else { "available" });
        }
        Commands::CheckFace { image } => {
            let bytes = std::fs::read(&image)?;
            let exists = service.face_exists(&bytes)?;
            println!("{}", if exists { "enrolled" } else { "not enrolled" });
        }
        Commands::RecordAttack { info, image } => {
            let bytes = match &image {
                Some(path) => Some(std::fs::read(path)?),
                None => None,
            };
            service.record_attack(&info, bytes.as_deref())?;
            println!("Recorded attack entry");
        }
        Commands::ListUnauthorized => {
            let records = service.list_unauthorized()?;
            if records.is_empty() {
                println!("No unauthorized probes recorded");
            }
            for record in records {
                println!(
                    "#{} at {} ({} bytes of evidence)",
                    record.id,
                    record.recorded_at.to_rfc3339(),
                    record.image.len()
                );
            }
        }
    }

    service.shutdown();
    Ok(())
}
