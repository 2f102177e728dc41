//! HomeHub Vault - CLI
//!
//! Command-line interface for library and vault operations.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use homehub_vault::{MediaContent, MediaLibrary};

#[derive(Parser)]
#[command(name = "homehub-vault")]
#[command(version = homehub_vault::VERSION)]
#[command(about = "HomeHub Vault - personal media library with an encrypted vault")]
struct Cli {
    /// Data directory
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One-time security setup (master password + PIN)
    Setup {
        /// Master password
        #[arg(short, long)]
        password: String,

        /// PIN code
        #[arg(long)]
        pin: String,
    },

    /// Show setup and lock state
    Status,

    /// Copy files into the library
    Upload {
        /// Files to import
        paths: Vec<PathBuf>,
    },

    /// Scan the plaintext root for unregistered files
    Scan,

    /// List media ids
    List {
        /// List vault items instead of plaintext ones
        #[arg(long)]
        vault: bool,

        /// PIN code (required for --vault)
        #[arg(long)]
        pin: Option<String>,
    },

    /// Move items into the vault, encrypting them
    Encrypt {
        /// Media ids
        ids: Vec<i64>,

        /// PIN code
        #[arg(long)]
        pin: String,
    },

    /// Move items out of the vault, decrypting them
    Decrypt {
        /// Media ids
        ids: Vec<i64>,

        /// PIN code
        #[arg(long)]
        pin: String,
    },

    /// Rotate the PIN (requires the master password)
    ChangePin {
        /// Master password
        #[arg(short, long)]
        password: String,

        /// New PIN code
        #[arg(long)]
        new_pin: String,
    },

    /// Write a media item's displayable content to a file
    Content {
        /// Media id
        id: i64,

        /// Output path
        output: PathBuf,

        /// PIN code (needed for vault items)
        #[arg(long)]
        pin: Option<String>,
    },

    /// Write a media item's thumbnail to a file
    Thumb {
        /// Media id
        id: i64,

        /// Output path
        output: PathBuf,

        /// PIN code (needed for vault items)
        #[arg(long)]
        pin: Option<String>,
    },

    /// Delete media items
    Delete {
        /// Media ids
        ids: Vec<i64>,
    },

    /// Show library statistics
    Stats {
        /// Emit JSON instead of the human-readable table
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let library = MediaLibrary::open(&cli.data)?;

    match cli.command {
        Commands::Setup { password, pin } => {
            library.setup(&password, &pin)?;
            println!("🔐 Vault security configured and unlocked");
        }

        Commands::Status => {
            let stats = library.stats()?;
            println!(
                "Setup: {}  Vault: {}",
                if stats.is_setup { "done" } else { "pending" },
                if stats.is_unlocked { "unlocked" } else { "locked" }
            );
        }

        Commands::Upload { paths } => {
            let mut count = 0;
            for path in &paths {
                match library.upload(path) {
                    Ok(id) => {
                        println!("📥 {} -> media {}", path.display(), id);
                        count += 1;
                    }
                    Err(e) => eprintln!("Skipping {}: {}", path.display(), e),
                }
            }
            println!("✅ Imported {} file(s)", count);
        }

        Commands::Scan => {
            let report = library.scan()?;
            println!(
                "✅ Scan done: {} found, {} added, {} updated, {} errors",
                report.found, report.added, report.updated, report.errors
            );
        }

        Commands::List { vault, pin } => {
            if vault {
                let pin = pin.ok_or_else(|| anyhow::anyhow!("--vault requires --pin"))?;
                library.login(&pin)?;
            }
            let ids = if vault {
                library.list_vault_ids()?
            } else {
                library.list_plain_ids()?
            };
            if ids.is_empty() {
                println!("📭 No media");
            }
            for id in ids {
                let record = library.find_media(id)?;
                println!(
                    "{:>6}  {}  {} ({} bytes)",
                    record.id, record.media_type, record.filename, record.file_size
                );
            }
        }

        Commands::Encrypt { ids, pin } => {
            library.login(&pin)?;
            let report = library.encrypt_items(&ids)?;
            println!(
                "🔒 Encrypted {} of {} (already done: {}, missing: {}, failed: {})",
                report.transitioned,
                report.requested,
                report.already_done,
                report.missing,
                report.failed
            );
        }

        Commands::Decrypt { ids, pin } => {
            library.login(&pin)?;
            let report = library.decrypt_items(&ids)?;
            println!(
                "🔓 Decrypted {} of {} (already done: {}, missing: {}, failed: {})",
                report.transitioned,
                report.requested,
                report.already_done,
                report.missing,
                report.failed
            );
        }

        Commands::ChangePin { password, new_pin } => {
            library.change_pin(&password, &new_pin)?;
            println!("✅ PIN changed");
        }

        Commands::Content { id, output, pin } => {
            if let Some(pin) = pin {
                library.login(&pin)?;
            }
            match library.get_content(id)? {
                MediaContent::File { path, content_type } => {
                    fs::copy(&path, &output)?;
                    println!("✅ {} ({}) -> {}", id, content_type, output.display());
                }
                MediaContent::Bytes { data, content_type } => {
                    fs::write(&output, &data)?;
                    println!("✅ {} ({}) -> {}", id, content_type, output.display());
                }
                MediaContent::Stream {
                    chunks,
                    content_type,
                } => {
                    let mut file = fs::File::create(&output)?;
                    for chunk in chunks {
                        file.write_all(&chunk?)?;
                    }
                    println!("✅ {} ({}) -> {}", id, content_type, output.display());
                }
            }
        }

        Commands::Thumb { id, output, pin } => {
            if let Some(pin) = pin {
                library.login(&pin)?;
            }
            let bytes = library.get_thumbnail(id)?;
            fs::write(&output, &bytes)?;
            println!("✅ Thumbnail for {} -> {}", id, output.display());
        }

        Commands::Delete { ids } => {
            let removed = library.delete_items(&ids);
            println!("🗑️ Deleted {} item(s)", removed);
        }

        Commands::Stats { json } => {
            let stats = library.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("📊 HomeHub Vault Statistics");
                println!("{:-<40}", "");
                println!("Total files:   {}", stats.total_files);
                println!(
                    "Total size:    {:.1} MB",
                    stats.total_size_bytes as f64 / 1024.0 / 1024.0
                );
                println!("Setup:         {}", stats.is_setup);
                println!("Unlocked:      {}", stats.is_unlocked);
            }
        }
    }

    Ok(())
}
