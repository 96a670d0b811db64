use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use apkpull::{
    adb::{Adb, ADB_EXE_PATH},
    app_name::ApkLabel,
    harvest::{HarvestConfig, Harvester, DEFAULT_SYSTEM_DIR, DEFAULT_USER_DIR},
    ledger::{Ledger, DEFAULT_LEDGER_PATH},
    mirror::{mirror_folder, DEFAULT_MIRROR_DIR, DEFAULT_REMOTE_FOLDER},
};
use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser)]
#[command(version, long_about = None)]
#[command(arg_required_else_help = true)]
#[command(about = "Pulls installed APKs and folders from an Android device over ADB")]
struct Cli {
    /// Path to the adb executable
    #[arg(long, global = true, default_value = ADB_EXE_PATH)]
    adb: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pulls the APK of every installed app, named after the app and its version.
    Apps {
        #[arg(long, default_value = DEFAULT_USER_DIR)]
        user_dir: PathBuf,
        #[arg(long, default_value = DEFAULT_SYSTEM_DIR)]
        system_dir: PathBuf,
        /// Database of already pulled APKs, used to skip unchanged apps
        #[arg(long, default_value = DEFAULT_LEDGER_PATH)]
        ledger: PathBuf,
        /// Pull every APK, without reading or writing the ledger
        #[arg(long)]
        no_ledger: bool,
        /// Only pull user-installed apps
        #[arg(long)]
        skip_system: bool,
    },
    /// Copies a folder on the device, and everything below it, to a local folder.
    Mirror {
        #[arg(long, default_value = DEFAULT_REMOTE_FOLDER)]
        remote: String,
        #[arg(long, default_value = DEFAULT_MIRROR_DIR)]
        local: PathBuf,
    },
    /// Prints the APKs recorded in the ledger as JSON.
    Ledger {
        #[arg(long, default_value = DEFAULT_LEDGER_PATH)]
        ledger: PathBuf,
    },
}

fn pull_apps(adb: &Adb, config: HarvestConfig, ledger_path: Option<&Path>) -> Result<()> {
    let mut harvester = Harvester::new(adb, ApkLabel, config);
    if let Some(path) = ledger_path {
        harvester = harvester.with_ledger(Ledger::open(path)?);
    }

    let summary = harvester.run()?;
    info!(
        "Pulled {} APKs, skipped {}, {} failed",
        summary.finalized, summary.skipped, summary.failed
    );

    if let Some(ledger) = harvester.into_ledger() {
        ledger.close()?;
    }
    Ok(())
}

fn print_ledger(path: &Path) -> Result<()> {
    // Opening would otherwise create an empty database.
    if !path.exists() {
        return Err(anyhow!("No ledger found at {}", path.display()));
    }

    let ledger = Ledger::open(path)?;
    let records = ledger.records().context("Reading ledger")?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    ledger.close()
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let adb = Adb::new(cli.adb);
    match cli.command {
        Commands::Apps { user_dir, system_dir, ledger, no_ledger, skip_system } => {
            let config = HarvestConfig {
                user_dir,
                system_dir,
                include_system: !skip_system,
            };
            pull_apps(&adb, config, (!no_ledger).then_some(ledger.as_path()))?
        }
        Commands::Mirror { remote, local } => {
            mirror_folder(&adb, &remote, &local)?;
        }
        Commands::Ledger { ledger } => print_ledger(&ledger)?,
    }

    Ok(())
}
