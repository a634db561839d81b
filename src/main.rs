use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_dashboard::api::state::AppState;
use agent_dashboard::calculate::{self, TrendPoint};
use agent_dashboard::config::AppConfig;
use agent_dashboard::dataset::{Dataset, DatasetStore};
use agent_dashboard::headshots;
use agent_dashboard::leaderboard::{ExclusionList, Leaderboard, LeaderboardQuery, Ranked, SortOrder};
use agent_dashboard::models::{Metric, PlayerContractRecord, Season, SummaryMetrics, ValueTier};
use agent_dashboard::names::NameNormalizer;
use agent_dashboard::source;

#[derive(Parser)]
#[command(name = "agent-dashboard")]
#[command(about = "Hockey agent value-capture dashboard")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: String,

    /// Data directory path (overrides config)
    #[arg(long)]
    data_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Download the workbook and report what it contains
    Fetch {
        /// Ignore any cached copy
        #[arg(long)]
        force: bool,
    },

    /// Print a leaderboard
    Leaderboard {
        /// capture_index, win_rate, contracts_tracked or total_contract_value
        #[arg(long, default_value = "capture_index")]
        metric: String,

        /// desc or asc
        #[arg(long, default_value = "desc")]
        order: String,

        /// Only rows with at least this many contracts tracked
        #[arg(long)]
        min_contracts: Option<u32>,

        /// Rank agencies instead of agents
        #[arg(long)]
        agencies: bool,

        /// Rows to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Print an agent profile
    Agent {
        /// Agent name or ID
        name: String,
    },

    /// Print an agency profile
    Agency {
        /// Agency name or ID
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&PathBuf::from(&cli.config))
        .with_context(|| format!("loading {}", cli.config))?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting agent-dashboard v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            let store = build_store(&config)?;
            let addr = format!("{}:{}", config.server.host, config.server.port);
            let headshots = headshots::load(&config).await;
            let state = AppState::new(config, store, headshots);

            // Warm the cache; the API reports 503 until a load succeeds
            if let Err(e) = state.store.get().await {
                tracing::warn!("Initial workbook load failed: {}", e);
            }

            let app = agent_dashboard::api::build_router(state);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("Dashboard API: http://{}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Fetch { force } => {
            let store = build_store(&config)?;
            let dataset = if force { store.reload().await? } else { store.get().await? };

            println!("\n=== Workbook ===");
            println!("Source:           {}", store.source_description());
            println!("Agents:           {}", dataset.agents.len());
            println!("Agent ranks:      {}", dataset.ranks.len());
            println!(
                "Agencies:         {}{}",
                dataset.agencies.len(),
                if dataset.agencies_derived { " (derived from players)" } else { "" }
            );
            println!("Player records:   {}", dataset.player_count());
            println!(
                "Seasons:          {}",
                dataset.seasons.iter().map(|s| s.label()).collect::<Vec<_>>().join(", ")
            );
        }
        Commands::Leaderboard {
            metric,
            order,
            min_contracts,
            agencies,
            limit,
        } => {
            let query = LeaderboardQuery {
                metric: metric.parse().map_err(|e: String| anyhow!(e))?,
                order: order.parse::<SortOrder>().map_err(|e| anyhow!(e))?,
                min_contracts,
            };
            let store = build_store(&config)?;
            let dataset = store.get().await?;
            let exclusions = ExclusionList::new(&config.leaderboard.excluded_agents);

            println!("\n=== {} ({:?}) ===", query.metric.label(), query.order);
            if agencies {
                print_leaderboard(&Leaderboard::build(&dataset.agencies, query, &exclusions), limit);
            } else {
                print_leaderboard(&Leaderboard::build(&dataset.agents, query, &exclusions), limit);
            }
        }
        Commands::Agent { name } => {
            let store = build_store(&config)?;
            let dataset = store.get().await?;
            print_agent(&dataset, &name, config.leaderboard.client_list_size)?;
        }
        Commands::Agency { name } => {
            let store = build_store(&config)?;
            let dataset = store.get().await?;
            print_agency(&dataset, &name, config.leaderboard.client_list_size)?;
        }
    }

    Ok(())
}

fn build_store(config: &AppConfig) -> Result<DatasetStore> {
    let source = source::from_config(config)?;
    Ok(DatasetStore::new(
        source,
        config.source.clone(),
        NameNormalizer::new(&config.name_corrections),
    ))
}

fn format_metric(metric: Metric, value: Option<f64>) -> String {
    let Some(v) = value else {
        return "n/a".to_string();
    };
    match metric {
        Metric::CaptureIndex => format!("{:.1}%", v * 100.0),
        Metric::WinRate => format!("{:.3}", v),
        Metric::ContractsTracked => format!("{}", v as u64),
        Metric::TotalContractValue => format_dollars(v),
    }
}

fn format_dollars(v: f64) -> String {
    let negative = v < 0.0;
    let digits = format!("{:.0}", v.abs());
    let mut out = String::with_capacity(digits.len() + 4);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if negative {
        format!("-${}", out)
    } else {
        format!("${}", out)
    }
}

fn print_leaderboard<T: Ranked>(board: &Leaderboard<'_, T>, limit: usize) {
    if board.is_empty() {
        println!("(no rows)");
        return;
    }
    for entry in board.page(0, limit) {
        println!(
            "{:>3}. {:<32} {:>16}  CT {}",
            entry.position,
            entry.row.name(),
            format_metric(board.query.metric, entry.value),
            entry.row.metrics().contracts_tracked
        );
    }
    if board.len() > limit {
        println!("... {} more", board.len() - limit);
    }
}

fn print_metrics(metrics: &SummaryMetrics) {
    println!("\n--- Financial Breakdown ---");
    for metric in Metric::ALL {
        println!("{:<24} {}", metric.label(), format_metric(metric, metrics.get(metric)));
    }
    println!(
        "{:<24} {}",
        "Classification",
        ValueTier::from_capture_index(metrics.capture_index)
    );
}

fn print_clients(records: &[&PlayerContractRecord], seasons: &[Season], n: usize) {
    println!(
        "\n--- Clients ({}) ---\nSix-year capture:        {}",
        records.len(),
        calculate::aggregate_capture_pct(records)
            .map(|p| format!("{:.2}%", p))
            .unwrap_or_else(|| "no data".to_string())
    );

    println!("\n--- Capture Trend ---");
    for TrendPoint { season, capture_pct, clients, .. } in calculate::season_trend(records, seasons) {
        let pct = capture_pct
            .map(|p| format!("{:.2}%", p))
            .unwrap_or_else(|| "no data".to_string());
        println!("{:<10} {:>10}  ({} clients)", season.label(), pct, clients);
    }

    let (top, bottom) = calculate::top_and_bottom(records, n);
    println!("\n--- Paid Most Above Value ---");
    for r in top {
        println!("{:<28} {:>16}", r.player_name, format_dollars(r.dollars_above_value()));
    }
    println!("\n--- Paid Most Below Value ---");
    for r in bottom {
        println!("{:<28} {:>16}", r.player_name, format_dollars(r.dollars_above_value()));
    }
}

fn print_agent(dataset: &Dataset, name: &str, client_list_size: usize) -> Result<()> {
    let Some(agent) = dataset.find_agent(name) else {
        bail!("Agent not found: {}", name);
    };

    println!(
        "\n=== {} - {} ===",
        agent.name,
        agent.agency_name.as_deref().unwrap_or("Independent")
    );
    print_metrics(&agent.metrics);

    if let Some(rank) = dataset.rank_for_agent(&agent.name) {
        println!("\n--- Agent Rankings ---");
        let population = dataset.rank_population();
        for metric in Metric::ALL {
            if let Some(r) = rank.rank(metric) {
                println!("{:<24} #{}/{}", metric.label(), r, population);
            }
        }
    }

    let records = dataset.records_for_agent(&agent.name);
    print_clients(&records, &dataset.seasons, client_list_size);
    Ok(())
}

fn print_agency(dataset: &Dataset, name: &str, client_list_size: usize) -> Result<()> {
    let Some(agency) = dataset.find_agency(name) else {
        bail!("Agency not found: {}", name);
    };

    println!("\n=== {} ===", agency.name);
    print_metrics(&agency.metrics);

    println!("\n--- Agents ---");
    for agent in dataset.agents_in_agency(&agency.name) {
        println!(
            "{:<32} {}",
            agent.name,
            format_metric(Metric::CaptureIndex, agent.metrics.capture_index)
        );
    }

    let records = dataset.records_for_agency(&agency.name);
    print_clients(&records, &dataset.seasons, client_list_size);
    Ok(())
}
