use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use nexus_core::{
    loadout::{class_name, grouped_by_class, ApplyClassification},
    AppConfig, BungieClient, CharacterId, Inventory, ItemInstanceId, Location, LoadoutApplyEngine,
    LoadoutStore, TransferOrchestrator, TransferOutcome, TransferRequest,
};

#[derive(Parser)]
#[command(name = "nexus")]
#[command(about = "Move items and apply loadouts across characters and the vault", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Move an item to "vault" or a character id
    Move {
        /// Item instance id
        item: String,
        /// Destination: "vault" or a character id
        target: String,
        /// Item hash, required together with --source
        #[arg(long, requires = "source")]
        hash: Option<u32>,
        /// Current location; skips the profile lookup
        #[arg(long, requires = "hash")]
        source: Option<String>,
    },
    /// Save the items equipped on a character as a loadout
    Snapshot {
        /// Character id
        character: String,
        /// Loadout name
        name: Option<String>,
    },
    /// Apply a stored loadout to a character
    Apply {
        /// Loadout id
        loadout: String,
        /// Character id
        character: String,
    },
    /// List stored loadouts grouped by class
    Loadouts,
}

pub struct NexusApp {
    config: AppConfig,
    client: BungieClient,
    orchestrator: TransferOrchestrator,
    inventory: Inventory,
    store: LoadoutStore,
}

impl NexusApp {
    pub fn new(config: AppConfig) -> Result<Self> {
        let client = BungieClient::new(&config).context("failed to build platform client")?;
        let orchestrator = TransferOrchestrator::new(Arc::new(client.clone()));
        let store = LoadoutStore::new(config.loadout_dir.clone());
        Ok(Self {
            config,
            client,
            orchestrator,
            inventory: Inventory::new(),
            store,
        })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Move {
                item,
                target,
                hash: Some(hash),
                source: Some(source),
            } => self.move_explicit(item, hash, &source, &target).await,
            Command::Move { item, target, .. } => self.move_tracked(item, &target).await,
            Command::Snapshot { character, name } => {
                self.snapshot(character, name.unwrap_or_default()).await
            }
            Command::Apply { loadout, character } => self.apply(&loadout, character).await,
            Command::Loadouts => self.list_loadouts(),
        }
    }

    async fn load_inventory(&self) -> Result<&Inventory> {
        let profile = self
            .client
            .profile()
            .await
            .context("failed to load profile")?;
        self.inventory.hydrate(&profile);
        Ok(&self.inventory)
    }

    async fn move_explicit(&self, item: String, hash: u32, source: &str, target: &str) -> Result<()> {
        let request = TransferRequest::parse(item, hash, source, target)?;
        let outcome = self.orchestrator.move_item(&request).await?;
        report_move(&request.item_instance_id, &request.target, outcome);
        Ok(())
    }

    async fn move_tracked(&self, item: String, target: &str) -> Result<()> {
        let target: Location = target.parse()?;
        let item = ItemInstanceId::new(item);
        let inventory = self.load_inventory().await?;
        let outcome = inventory
            .transfer(&self.orchestrator, &item, target.clone())
            .await?;
        report_move(&item, &target, outcome);
        Ok(())
    }

    async fn snapshot(&self, character: String, name: String) -> Result<()> {
        let character = CharacterId::new(character);
        let inventory = self.load_inventory().await?;
        match self.store.snapshot(inventory, &character, &name)? {
            Some(loadout) => {
                println!(
                    "Saved '{}' ({} items) as {}",
                    loadout.name,
                    loadout.items.len(),
                    loadout.id
                );
                Ok(())
            }
            None => bail!("character {character} has no equipped items"),
        }
    }

    async fn apply(&self, loadout_id: &str, character: String) -> Result<()> {
        let loadout = self
            .store
            .get(loadout_id)?
            .with_context(|| format!("no loadout with id {loadout_id}"))?;
        let target = CharacterId::new(character);
        let inventory = self.load_inventory().await?;

        let engine = LoadoutApplyEngine::new(
            self.orchestrator.clone(),
            Arc::new(self.client.clone()),
            Arc::new(inventory.clone()),
        )
        .with_mode(self.config.apply_mode);

        let (progress_tx, mut progress_rx) = mpsc::channel(16);
        let printer = tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                match serde_json::to_string(&progress) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!("failed to encode progress: {err}"),
                }
            }
        });

        let result = engine
            .apply_with_progress(&loadout, &target, progress_tx)
            .await;
        if let Err(err) = printer.await {
            warn!("progress printer stopped: {err}");
        }

        inventory.record_apply(&result, &target);

        for report in &result.items {
            println!(
                "{:<22} {:>10}  {}",
                report.item_instance_id, report.item_hash, report.outcome
            );
        }
        let summary = result.progress();
        println!(
            "{:?}: {} succeeded, {} failed",
            result.classification, summary.succeeded, summary.failed
        );
        println!("{}", equipped_summary(inventory, &target));

        if result.classification == ApplyClassification::Failure {
            bail!("loadout '{}' could not be applied", loadout.name);
        }
        Ok(())
    }

    fn list_loadouts(&self) -> Result<()> {
        let loadouts = self.store.list()?;
        if loadouts.is_empty() {
            println!("No loadouts in {}", self.store.root().display());
            return Ok(());
        }
        for (class, group) in grouped_by_class(&loadouts) {
            println!("{}", class_name(class));
            for loadout in group {
                println!(
                    "  {:<32} {:<24} {} items",
                    loadout.id,
                    loadout.name,
                    loadout.items.len()
                );
            }
        }
        Ok(())
    }
}

fn report_move(item: &ItemInstanceId, target: &Location, outcome: TransferOutcome) {
    match outcome {
        TransferOutcome::Unchanged => println!("{item} is already in {target}"),
        TransferOutcome::Moved { hops } => {
            info!(%item, %target, hops, "Item moved");
            println!("{item} moved to {target} ({hops} hop(s))");
        }
    }
}

fn equipped_summary(inventory: &Inventory, character: &CharacterId) -> String {
    let equipped = inventory.equipped_on(character);
    if equipped.is_empty() {
        return format!("Nothing equipped on {character}");
    }
    let ids: Vec<&str> = equipped
        .iter()
        .map(|item| item.item_instance_id.as_str())
        .collect();
    format!("Equipped on {character}: {}", ids.join(", "))
}
