use anyhow::Context;
use clap::{Parser, Subcommand};
use eda_common::db::catalog::{Catalog, FileCatalog, MemoryCatalog};
use eda_common::db::core::{Design, Direction};
use eda_common::db::indices::CellId;
use eda_common::db::occurrence::Occurrence;
use eda_common::util::config::Config;
use eda_common::util::{check, generator, logger, visualization};
use eda_cts::htree::HTree;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the clock tree and save the result.
    Run,
    /// Build the clock tree in memory and verify it.
    Check,
    /// Write a random hierarchical register design.
    Generate {
        /// Side of the square top cell, in lambda.
        #[arg(long, default_value_t = 1000.0)]
        side: f64,
        #[arg(long, default_value_t = 4)]
        blocks: usize,
        #[arg(long, default_value_t = 8)]
        regs_per_block: usize,
        #[arg(long, default_value_t = 16)]
        flat_regs: usize,
        #[arg(long, default_value = "inputs/design.toml")]
        output: String,
    },
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let config = if args.config.exists() {
        log::info!("Loading configuration from {:?}", args.config);
        let config_str = std::fs::read_to_string(&args.config)
            .with_context(|| format!("Failed to read config file {:?}", args.config))?;
        toml::from_str(&config_str).context("Failed to parse config TOML")?
    } else {
        log::warn!(
            "Configuration file {:?} not found. Using internal defaults.",
            args.config
        );
        Config::default()
    };

    match args.command.unwrap_or(Commands::Run) {
        Commands::Generate {
            side,
            blocks,
            regs_per_block,
            flat_regs,
            output,
        } => {
            prepare_output_dir(&output)?;
            log::info!(
                "Generating register design ({} lambda, {} blocks x {} registers, {} flat)...",
                side,
                blocks,
                regs_per_block,
                flat_regs
            );
            generator::generate_register_design(&output, side, blocks, regs_per_block, flat_regs)?;
            log::info!("Generated: {}", output);
        }
        Commands::Run => {
            let mut catalog = FileCatalog::new(&config.input.output_dir).with_context(|| {
                format!("Cannot create output directory {}", config.input.output_dir)
            })?;
            if run_flow(&config, &mut catalog, true).is_err() {
                std::process::exit(1);
            }
        }
        Commands::Check => {
            let mut catalog = MemoryCatalog::default();
            if run_flow(&config, &mut catalog, false).is_err() {
                std::process::exit(1);
            }
            log::info!("{} cells would be saved.", catalog.saved.len());
        }
    }

    Ok(())
}

fn prepare_output_dir(path_str: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path_str).parent()
        && !parent.exists()
        && !parent.as_os_str().is_empty()
    {
        log::info!("Creating output directory: {:?}", parent);
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// The configured top cell, or the only non-terminal cell no one instantiates.
fn find_top_cell(db: &Design, config: &Config) -> anyhow::Result<CellId> {
    if let Some(name) = &config.input.top_cell {
        return db
            .cell_by_name(name)
            .ok_or_else(|| anyhow::anyhow!("Top cell '{}' not found in design", name));
    }
    let instantiated: HashSet<CellId> = db
        .instances
        .iter()
        .filter(|i| i.alive)
        .map(|i| i.master)
        .collect();
    let candidates: Vec<CellId> = (0..db.num_cells())
        .map(CellId::new)
        .filter(|&c| !db.cell(c).is_terminal && !instantiated.contains(&c))
        .collect();
    match candidates.as_slice() {
        [top] => Ok(*top),
        [] => Err(anyhow::anyhow!("No top cell found in design")),
        _ => Err(anyhow::anyhow!(
            "{} top cell candidates, set input.top_cell",
            candidates.len()
        )),
    }
}

fn run_flow(config: &Config, catalog: &mut dyn Catalog, draw: bool) -> anyhow::Result<()> {
    let mut db = Design::new();
    log::info!("Parsing design: {}", config.input.design_file);
    eda_common::db::parser::design::parse(&mut db, &config.input.design_file)
        .with_context(|| format!("Invalid design file '{}'", config.input.design_file))?;
    let top = find_top_cell(&db, config)?;

    let tree = match eda_cts::run(&mut db, config, top, catalog) {
        Ok(tree) => tree,
        Err(e) => {
            let message = e.message();
            message.log();
            eprintln!("{}", message);
            return Err(e.into());
        }
    };

    verify(&db, &tree)?;

    if draw {
        let filename = Path::new(&config.input.output_dir).join("clock_tree.png");
        log::info!("Generating clock tree visualization: {:?}", filename);
        visualization::draw_clock_tree(&db, top, &filename.to_string_lossy(), 1000, 1000)
            .context("Failed to write visualization")?;
    }
    Ok(())
}

fn verify(db: &Design, tree: &HTree) -> anyhow::Result<()> {
    let sinks: Vec<Occurrence> = tree.leafs().cloned().collect();
    let others: Vec<Occurrence> = db
        .terminal_plug_occurrences(tree.master_clock())
        .into_iter()
        .filter(|o| {
            o.plug.instance != tree.top_buffer()
                && db.net(o.plug.master_net).direction != Direction::Out
        })
        .collect();
    if !others.is_empty() {
        log::warn!(
            "{} sinks are still on the master clock, first is '{}'.",
            others.len(),
            others[0].name(db)
        );
    }

    check::run(db, &tree.clock_nets(db), &sinks, tree.master_clock()).map_err(|e| anyhow::anyhow!(e))?;
    check::run_placement_check(db, tree.cell(), &["ck_htree", "htree_feed_"])
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}
