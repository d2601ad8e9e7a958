use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use service_desk_api::{
    auth::permissions::AGENTS_GROUP,
    config::{self, AppConfig},
    db::{self, DbPool},
    services::{
        service_orders::ServiceOrderService,
        statistics::StatisticsService,
        users::{CreateUserRequest, UserDetail, UserService},
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => handle_migrate(&context).await?,
        Commands::CreateSuperuser(args) => handle_create_account(&context, args, true, cli.json).await?,
        Commands::CreateAgent(args) => handle_create_account(&context, args, false, cli.json).await?,
        Commands::Stats(args) => handle_stats(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "service-desk", about = "Service desk administration CLI", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Create an account that passes every permission check
    CreateSuperuser(AccountArgs),
    /// Create an account in the agents group
    CreateAgent(AccountArgs),
    /// Print the statistics snapshot the assistant would see
    Stats(StatsArgs),
}

#[derive(Args)]
struct AccountArgs {
    #[arg(long, help = "Login name for the account")]
    username: String,
    #[arg(long, help = "Contact email for the account")]
    email: Option<String>,
    #[arg(long, help = "Password for the account")]
    password: String,
}

#[derive(Args)]
struct StatsArgs {
    #[arg(long, help = "User whose requested or assigned orders are counted")]
    user_id: i32,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Also print the order summary counters"
    )]
    summary: bool,
}

struct CliContext {
    db: Arc<DbPool>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config: AppConfig = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;

        Ok(Self {
            db: Arc::new(db_pool),
        })
    }

    fn user_service(&self) -> UserService {
        UserService::new(self.db.clone())
    }
}

async fn handle_migrate(context: &CliContext) -> Result<()> {
    db::run_migrations(&context.db)
        .await
        .context("failed to run migrations")?;
    println!("Migrations applied");
    Ok(())
}

async fn handle_create_account(
    context: &CliContext,
    args: AccountArgs,
    superuser: bool,
    json: bool,
) -> Result<()> {
    let service = context.user_service();
    let request = CreateUserRequest {
        username: args.username,
        password: args.password,
        email: args.email,
        first_name: None,
        last_name: None,
        is_staff: superuser,
        is_superuser: superuser,
        groups: Vec::new(),
        user_permissions: Vec::new(),
    };

    let created = service
        .create_user(request)
        .await
        .context("failed to create account")?;

    let detail = if superuser {
        created
    } else {
        service
            .add_to_group(created.user.id, AGENTS_GROUP)
            .await
            .context("failed to add account to the agents group")?;
        service.get_user(created.user.id).await?
    };

    if json {
        print_json(&detail)?;
    } else {
        render_account(&detail);
    }
    Ok(())
}

async fn handle_stats(context: &CliContext, args: StatsArgs, json: bool) -> Result<()> {
    let snapshot = StatisticsService::new(context.db.clone())
        .snapshot(args.user_id)
        .await
        .context("failed to compute statistics")?;

    if json {
        print_json(&snapshot)?;
    } else {
        println!("Total orders:        {}", snapshot.total_orders);
        println!("Orders for user {}:  {}", args.user_id, snapshot.user_orders_count);
        println!("Completed orders:    {}", snapshot.completed_orders);
        println!("Avg completion days: {:.2}", snapshot.avg_completion_days);
        println!("Delayed open orders: {}", snapshot.delayed_count);
        for (priority, days) in snapshot.priority_stats.iter() {
            println!("  {:<6} {:.2} days", priority.label(), days);
        }
    }

    if args.summary {
        let summary = ServiceOrderService::new(context.db.clone())
            .summary()
            .await
            .context("failed to compute order summary")?;
        if json {
            print_json(&summary)?;
        } else {
            println!(
                "Open {} • closed {} • unresolved {} • high priority {} • overdue {}",
                summary.open,
                summary.closed,
                summary.unresolved,
                summary.high_priority,
                summary.overdue
            );
        }
    }

    Ok(())
}

fn render_account(detail: &UserDetail) {
    println!(
        "- User {} (id {}) • superuser {} • groups [{}]",
        detail.user.username,
        detail.user.id,
        detail.user.is_superuser,
        detail.groups.join(", ")
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
