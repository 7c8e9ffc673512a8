//! vrcosc - headless host for VRCOSC modules
//!
//! Loads the built-in modules, starts the enabled ones against VRChat's OSC
//! ports and stops them again on Ctrl+C.

mod config;
mod error;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use config::Config;
use vrcosc_core::module::AttributeValue;
use vrcosc_core::{
    modules, CancellationToken, FileStorage, Module, ModuleInstance, ModuleServices, OscClient,
    SettingsStorage,
};

#[derive(Parser)]
#[command(name = "vrcosc")]
#[command(author, version, about = "Run VRCOSC modules against VRChat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path (default: ~/.config/vrcosc/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host VRChat runs on
    #[arg(long)]
    address: Option<String>,

    /// Port VRChat listens on
    #[arg(long)]
    send_port: Option<u16>,

    /// Port VRChat sends avatar parameters to
    #[arg(long)]
    receive_port: Option<u16>,

    /// Directory for module settings files
    #[arg(long)]
    storage_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every enabled module (default)
    Run,
    /// List the built-in modules and their settings
    Modules,
    /// Enable a module by id
    Enable { module: String },
    /// Disable a module by id
    Disable { module: String },
    /// Create a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the configuration file path
    ConfigPath,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::InitConfig { force }) => {
            let path = match &cli.config {
                Some(path) => path.clone(),
                None => Config::config_path()?,
            };
            Config::create_default_config_file(&path, force)?;
            println!("Created default config at: {}", path.display());
            return Ok(());
        }
        Some(Commands::ConfigPath) => {
            println!("{}", Config::config_path()?.display());
            return Ok(());
        }
        _ => {}
    }

    let mut config = Config::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(address) = cli.address {
        config.osc.address = address;
    }
    if let Some(port) = cli.send_port {
        config.osc.send_port = port;
    }
    if let Some(port) = cli.receive_port {
        config.osc.receive_port = port;
    }
    if let Some(dir) = cli.storage_dir {
        config.storage.directory = Some(dir);
    }

    let storage_dir = config.storage_dir()?;
    let storage: Arc<dyn SettingsStorage> = Arc::new(FileStorage::new(&storage_dir));
    log::debug!("Module settings in {}", storage_dir.display());

    match cli.command {
        Some(Commands::Modules) => list_modules(storage),
        Some(Commands::Enable { module }) => set_enabled(storage, &module, true),
        Some(Commands::Disable { module }) => set_enabled(storage, &module, false),
        _ => run(&config, storage),
    }
}

/// Initialise every built-in module against `services`.
fn load_modules(services: &ModuleServices) -> Result<Vec<ModuleInstance>> {
    modules::builtin()
        .into_iter()
        .map(|module| {
            let title = module.title().to_string();
            ModuleInstance::initialise(module, services.clone())
                .with_context(|| format!("Failed to initialise module {}", title))
        })
        .collect()
}

fn run(config: &Config, storage: Arc<dyn SettingsStorage>) -> Result<()> {
    let client = OscClient::new(config.osc.send_addr())
        .with_context(|| format!("Failed to open OSC socket for {}", config.osc.send_addr()))?;
    client
        .enable_receive(&config.osc.receive_addr())
        .with_context(|| format!("Failed to listen on {}", config.osc.receive_addr()))?;

    let services = ModuleServices::new(storage, client.clone());
    let instances = load_modules(&services)?;
    let cancel = CancellationToken::new();

    let mut started = 0;
    for instance in &instances {
        if !instance.is_enabled() {
            continue;
        }
        match instance.start(&cancel) {
            Ok(()) => started += 1,
            Err(e) => log::warn!("Module {} did not start: {:#}", instance.id(), e),
        }
    }

    if started == 0 {
        log::warn!("No modules enabled. Enable one with `vrcosc enable <id>`, see `vrcosc modules`");
    } else {
        log::info!("Sending to {}, {} module(s) running", client.target(), started);
    }

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("Error setting Ctrl-C handler")?;
    log::info!("Press Ctrl+C to exit");

    let _ = stop_rx.recv();
    log::info!("Interrupted by user, stopping modules...");

    cancel.cancel();
    let failed = instances
        .iter()
        .filter(|instance| instance.stop().is_err())
        .count();
    client.disable_receive();
    if failed > 0 {
        anyhow::bail!("{} module(s) did not stop cleanly", failed);
    }
    Ok(())
}

fn list_modules(storage: Arc<dyn SettingsStorage>) -> Result<()> {
    let services = ModuleServices::noop().with_storage(storage);
    for instance in load_modules(&services)? {
        let status = if instance.is_enabled() { "enabled" } else { "disabled" };
        println!("{} ({}) - {}", instance.id(), status, instance.title());
        if !instance.description().is_empty() {
            println!("  {}", instance.description());
        }

        instance.with_settings(|settings| {
            for (lookup, attribute) in settings.iter() {
                let value = match (attribute.value(), attribute.values()) {
                    (Some(value), _) => value.to_string(),
                    (None, Some(values)) => format!(
                        "[{}]",
                        values
                            .iter()
                            .map(AttributeValue::to_string)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    (None, None) => String::new(),
                };
                println!(
                    "  {:<16} {:<24} {}",
                    lookup,
                    value,
                    attribute.metadata().display_name
                );
            }
        });

        for (lookup, parameter) in instance.parameters() {
            println!(
                "  {:<16} {:?} {} ({})",
                lookup,
                parameter.mode(),
                parameter.address(),
                parameter.expected()
            );
        }
    }
    Ok(())
}

fn set_enabled(storage: Arc<dyn SettingsStorage>, id: &str, enabled: bool) -> Result<()> {
    let services = ModuleServices::noop().with_storage(storage);
    let instance = load_modules(&services)?
        .into_iter()
        .find(|instance| instance.id().eq_ignore_ascii_case(id))
        .with_context(|| format!("No module named {}, see `vrcosc modules`", id))?;

    instance.set_enabled(enabled)?;
    println!(
        "{} {}",
        if enabled { "Enabled" } else { "Disabled" },
        instance.id()
    );
    Ok(())
}
