use clap::{Parser, Subcommand};

use crate::config::EngineConfig;
use crate::model::timetable::Timetable;
use crate::model::TransferError;
use crate::routing::BeelineRouter;
use crate::storage::{FirstStage, RoutingMode, StorageUpdater};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct TransfersAppArguments {
    #[command(subcommand)]
    pub app: App,
}

#[derive(Subcommand)]
pub enum App {
    /// run the complete pipeline against an empty or fresh database
    Full {
        #[arg(long, help = "path to a .toml or .json engine configuration")]
        config: String,
    },
    /// resume from persisted state, rerunning selected stages
    Partial {
        #[arg(long, help = "path to a .toml or .json engine configuration")]
        config: String,
        #[arg(
            long,
            value_enum,
            default_value = "none",
            help = "earliest pipeline stage to rerun; later stages cascade"
        )]
        first_stage: FirstStage,
        #[arg(
            long,
            value_enum,
            default_value = "partial",
            help = "which persisted transfer requests to (re)route"
        )]
        routing: RoutingMode,
    },
}

pub fn run(app: &App) -> Result<(), TransferError> {
    env_logger::init();
    match app {
        App::Full { config } => {
            let mut updater = build_updater(config)?;
            updater.full_update()?;
        }
        App::Partial {
            config,
            first_stage,
            routing,
        } => {
            let mut updater = build_updater(config)?;
            updater.partial_update(*first_stage, *routing)?;
        }
    }
    eprintln!("finished.");
    Ok(())
}

fn build_updater(config_path: &String) -> Result<StorageUpdater, TransferError> {
    log::info!("reading engine configuration from {config_path}");
    let config = EngineConfig::try_from(config_path)?;
    if let Some(graph_path) = &config.router_graph_path {
        log::info!(
            "router graph {} ignored by the built-in beeline router",
            graph_path.display()
        );
    }
    let timetable = Timetable::read_csv(&config.timetable_path)?;
    StorageUpdater::new(timetable, &config, Box::new(BeelineRouter::new()))
}
