//! # STELLAR Draw Harness
//!
//! Drives the gacha engine from the command line against a write-ahead log
//! or a throwaway in-memory store.
//!
//! ## Usage
//!
//! ```bash
//! stellar --wal data/players.wal draw 1001 --name Stelle --count 10 --batches 3
//! stellar --wal data/players.wal profile 1001
//! stellar --wal data/players.wal daily 1001
//! stellar --wal data/players.wal leaderboard --top 5
//! ```

mod catalog_file;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stellar_gacha::{
    CurrencyKind, DrawEngine, EngineConfig, GachaError, MemoryStore, OutcomeTag, PlayerStore, Rarity, WalStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Catalog of items and banners
    #[arg(long, default_value = "data/catalog.toml")]
    catalog: PathBuf,

    /// Engine config; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write-ahead log; runs in memory when omitted
    #[arg(long)]
    wal: Option<PathBuf>,

    /// Seed for reproducible draws
    #[arg(short, long)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone)]
enum Command {
    /// Run draw batches for a player, registering them if needed
    Draw {
        /// Player id
        player: String,
        /// Display name used on registration
        #[arg(long, default_value = "Trailblazer")]
        name: String,
        /// Banner to switch to before drawing
        #[arg(long)]
        banner: Option<String>,
        /// Draws per batch
        #[arg(short = 'n', long, default_value_t = 10)]
        count: u32,
        /// Number of batches
        #[arg(short, long, default_value_t = 1)]
        batches: u32,
        /// Credit the banner currency before drawing
        #[arg(long)]
        grant: Option<u64>,
    },
    /// Show a player's wallet, pity and collection
    Profile {
        /// Player id
        player: String,
    },
    /// Show a player's latest draws
    History {
        /// Player id
        player: String,
        /// Rows to show (1 to 50)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Claim a player's daily reward
    Daily {
        /// Player id
        player: String,
    },
    /// Show the odds of a player's next draw
    Odds {
        /// Player id
        player: String,
    },
    /// Show global draw totals
    Stats,
    /// Show the players with the most draws
    Leaderboard {
        /// Rows to show (1 to 100)
        #[arg(long)]
        top: Option<usize>,
    },
    /// Compact the write-ahead log
    Checkpoint,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let catalog = Arc::new(catalog_file::load(&args.catalog)?);
    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    tracing::info!(
        items = catalog.item_count(),
        banners = catalog.banners().count(),
        standard = %catalog.standard_banner().id,
        "catalog loaded"
    );

    match &args.wal {
        Some(path) => {
            let store = Arc::new(WalStore::open(path).with_context(|| format!("opening wal {}", path.display()))?);
            if matches!(args.command, Command::Checkpoint) {
                store.checkpoint()?;
                println!("checkpoint written to {}", path.display());
                return Ok(());
            }
            let engine = build_engine(catalog, Arc::clone(&store), config, args.seed)?;
            run(&engine, args.command)
        }
        None => {
            if matches!(args.command, Command::Checkpoint) {
                anyhow::bail!("checkpoint needs --wal");
            }
            tracing::warn!("no --wal given, state is discarded on exit");
            let engine = build_engine(catalog, MemoryStore::new(), config, args.seed)?;
            run(&engine, args.command)
        }
    }
}

fn build_engine<S: PlayerStore>(
    catalog: Arc<stellar_gacha::Catalog>,
    store: S,
    config: EngineConfig,
    seed: Option<u64>,
) -> anyhow::Result<DrawEngine<S>> {
    let engine = DrawEngine::new(catalog, store, config).context("engine rejected its configuration")?;
    Ok(match seed {
        Some(seed) => engine.with_seed(seed),
        None => engine,
    })
}

fn run<S: PlayerStore>(engine: &DrawEngine<S>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Draw {
            player,
            name,
            banner,
            count,
            batches,
            grant,
        } => draw(engine, &player, &name, banner.as_deref(), count, batches, grant),
        Command::Profile { player } => profile(engine, &player),
        Command::History { player, limit } => {
            for row in engine.history(&player, limit)? {
                println!(
                    "{}  {:<24} {} {:<28} {}",
                    row.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    row.banner_id,
                    row.rarity,
                    row.item_id,
                    row.category
                );
            }
            Ok(())
        }
        Command::Daily { player } => {
            let daily = engine.config().daily;
            match engine.claim_daily(&player, chrono::Utc::now()) {
                Ok(wallet) => {
                    println!("+{} {}, now {}", daily.amount, daily.currency, wallet.get(daily.currency));
                    Ok(())
                }
                Err(GachaError::DailyCooldown { remaining }) => {
                    println!(
                        "already claimed, next in {}h {}m",
                        remaining.num_hours(),
                        remaining.num_minutes() % 60
                    );
                    Ok(())
                }
                Err(e) => Err(e).context("claiming daily reward"),
            }
        }
        Command::Odds { player } => {
            let odds = engine.odds(&player)?;
            println!("banner:     {}", odds.banner_id);
            println!("5★:         {:.2}%", odds.odds.five * 100.0);
            println!("4★:         {:.2}%", odds.odds.four * 100.0);
            println!("3★:         {:.2}%", odds.odds.three() * 100.0);
            println!("pity:       4★ {} / 5★ {}", odds.pity4, odds.pity5);
            println!("guaranteed: {}", odds.featured_guaranteed);
            Ok(())
        }
        Command::Stats => {
            let stats = engine.global_stats()?;
            println!("players: {}", stats.total_players);
            println!("draws:   {}", stats.total_draws);
            println!("5★ {}  4★ {}  3★ {}", stats.five_star, stats.four_star, stats.three_star);
            Ok(())
        }
        Command::Leaderboard { top } => {
            for entry in engine.leaderboard(top)? {
                println!(
                    "{:>3}. {:<20} {:>6} draws  {:>4} 5★",
                    entry.position, entry.name, entry.total_draws, entry.five_star
                );
            }
            Ok(())
        }
        Command::Checkpoint => anyhow::bail!("checkpoint needs --wal"),
    }
}

fn draw<S: PlayerStore>(
    engine: &DrawEngine<S>,
    player: &str,
    name: &str,
    banner: Option<&str>,
    count: u32,
    batches: u32,
    grant: Option<u64>,
) -> anyhow::Result<()> {
    match engine.register_player(player, name) {
        Ok(_) | Err(GachaError::AlreadyRegistered(_)) => {}
        Err(e) => return Err(e).context("registering player"),
    }
    if let Some(banner) = banner {
        engine.set_active_banner(player, banner)?;
    }
    if let Some(amount) = grant {
        let active = engine.profile(player)?.pity.active_banner;
        let currency = engine
            .catalog()
            .banner(&active)
            .map_or(CurrencyKind::Standard, |b| b.currency);
        engine.grant_currency(player, currency, amount)?;
    }

    for batch in 1..=batches {
        let outcomes = engine
            .run_draws(player, count)
            .with_context(|| format!("batch {batch} of {batches}"))?;
        println!("── batch {batch} ──");
        for outcome in outcomes {
            let marker = match outcome.rarity {
                Rarity::Five if outcome.is_featured => " ★ featured",
                Rarity::Five => " ★",
                _ => "",
            };
            let effect = match outcome.tag {
                OutcomeTag::NewAcquisition => "new".to_string(),
                OutcomeTag::RankUp { rank } => format!("rank {rank}"),
                OutcomeTag::ConvertedCurrency { currency, amount } => format!("+{amount} {currency}"),
                OutcomeTag::AtCapNoReward => "at cap".to_string(),
            };
            println!("  {} {:<28} {:<10}{marker}", outcome.rarity, outcome.item_id, effect);
        }
    }

    profile(engine, player)
}

fn profile<S: PlayerStore>(engine: &DrawEngine<S>, player: &str) -> anyhow::Result<()> {
    let profile = engine.profile(player)?;
    println!("┌─ {} ({})", profile.name, profile.player_id);
    println!(
        "│ wallet:  {} standard, {} special, {} credits",
        profile.wallet.standard, profile.wallet.special, profile.wallet.credits
    );
    println!(
        "│ pity:    4★ {} / 5★ {} on {}",
        profile.pity.pity4, profile.pity.pity5, profile.pity.active_banner
    );
    println!("│ draws:   {}", profile.total_draws);
    for item in engine.inventory(player)? {
        let rarity = item.rarity.map_or_else(|| "?".to_string(), |r| r.to_string());
        println!("│   {rarity} {:<28} x{} (rank {})", item.name, item.copies, item.rank);
    }
    println!("└─");
    Ok(())
}
