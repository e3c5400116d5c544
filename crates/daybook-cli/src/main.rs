use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "daybook", version, about = "Daybook CLI")]
struct Cli {
    /// Act as this viewer instead of the configured `viewer_id`
    #[arg(long = "as", global = true)]
    viewer: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the gate state, today's entry and remaining budget
    Status,
    /// Create or edit today's entry
    Post(commands::post::EntryArgs),
    /// Change the visibility of today's entry
    Visibility {
        /// everyone, friends or only-me
        visibility: daybook_core::Visibility,
    },
    /// Delete one of your entries
    Delete {
        /// Entry ID
        entry_id: String,
    },
    /// Page through the feed
    Feed {
        /// discover, similar-goals, friends, nearby, saved or all
        #[arg(long)]
        filter: Option<daybook_core::FeedFilter>,
        /// Number of pages to load
        #[arg(long, default_value = "1")]
        pages: usize,
    },
    /// Give or take back kudos
    Kudos {
        entry_id: String,
        #[arg(long)]
        off: bool,
    },
    /// Save or unsave an entry
    Save {
        entry_id: String,
        #[arg(long)]
        off: bool,
    },
    /// Hide an entry from your feed
    Hide { entry_id: String },
    /// Meter a feed viewing session
    Watch {
        /// How long to view for
        #[arg(long, default_value = "10")]
        seconds: u64,
    },
    /// Today's usage counter
    Usage,
    /// Local draft of today's entry
    Draft {
        #[command(subcommand)]
        action: commands::post::DraftAction,
    },
    /// Streaks and totals
    Stats,
    /// Friends, blocks, goals and region
    Social {
        #[command(subcommand)]
        action: commands::social::SocialAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DAYBOOK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Config { action } = cli.command {
        return commands::config::run(action);
    }

    let ctx = commands::Context::open(cli.viewer)?;
    match cli.command {
        Commands::Status => commands::status::run(&ctx).await,
        Commands::Post(args) => commands::post::post(&ctx, args).await,
        Commands::Visibility { visibility } => commands::post::visibility(&ctx, visibility).await,
        Commands::Delete { entry_id } => commands::post::delete(&ctx, &entry_id).await,
        Commands::Feed { filter, pages } => commands::feed::list(&ctx, filter, pages).await,
        Commands::Kudos { entry_id, off } => commands::feed::kudos(&ctx, &entry_id, !off).await,
        Commands::Save { entry_id, off } => commands::feed::save(&ctx, &entry_id, !off).await,
        Commands::Hide { entry_id } => commands::feed::hide(&ctx, &entry_id).await,
        Commands::Watch { seconds } => commands::usage::watch(&ctx, seconds).await,
        Commands::Usage => commands::usage::show(&ctx).await,
        Commands::Draft { action } => commands::post::draft(&ctx, action),
        Commands::Stats => commands::stats::run(&ctx),
        Commands::Social { action } => commands::social::run(&ctx, action),
        Commands::Config { .. } => Ok(()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
