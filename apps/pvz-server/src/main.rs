use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use std::path::{Path, PathBuf};

use api_ingress::ApiIngress;
use grpc_hub::{GrpcHub, ReadySignal, RegisterGrpcServiceFn};
use pvz_bootstrap::{AppConfig, CliArgs};
use pvz_service::infra::storage::postgres;
use pvz_service::{AuthSettings, PvzModule, PvzServiceConfig, Storage};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const MODULE_NAME: &str = "pvz_service";

/// PVZ Server - pickup point reception backend
#[derive(Parser)]
#[command(name = "pvz-server")]
#[command(about = "PVZ Server - pickup point reception backend")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use in-memory storage instead of PostgreSQL
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
        mock: cli.mock,
    };

    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    pvz_bootstrap::init_logging(&logging_config, Path::new(&config.home_dir));

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config, args).await,
        Commands::Check => check_config(&config, &args),
    }
}

async fn run_server(config: AppConfig, args: CliArgs) -> Result<()> {
    tracing::info!(bind_addr = %config.server.bind_addr, mock = args.mock, "PVZ server starting");

    let auth = auth_settings(&config)?;
    let module_config: PvzServiceConfig = config.module_config(MODULE_NAME)?;
    let storage = open_storage(&config, args.mock).await?;
    let module = PvzModule::new(storage, &auth, module_config)?;

    let cancel = CancellationToken::new();
    tokio::spawn(pvz_bootstrap::cancel_on_shutdown(cancel.clone()));

    let ingress = ApiIngress::new(config.server.clone());
    let router = ingress.build_router(module.register_rest(axum::Router::new()));

    let http = async {
        let res = ingress.serve(router, cancel.clone()).await;
        if res.is_err() {
            cancel.cancel();
        }
        res.context("HTTP server failed")
    };

    let grpc = async {
        let Some(grpc_config) = config.grpc.clone() else {
            tracing::info!("no grpc section configured; gRPC listener disabled");
            return Ok(());
        };
        let installer = {
            let module = module.clone();
            RegisterGrpcServiceFn {
                service_name: module.grpc_service_name(),
                register: Box::new(move |routes| {
                    routes.add_service(module.grpc_service());
                }),
            }
        };
        let (tx, _ready) = oneshot::channel();
        let res = GrpcHub::new(grpc_config)
            .run_with_installers(vec![installer], cancel.clone(), ReadySignal::from_sender(tx))
            .await;
        if res.is_err() {
            cancel.cancel();
        }
        res.context("gRPC server failed")
    };

    let (http_res, grpc_res) = tokio::join!(http, grpc);
    http_res?;
    grpc_res?;

    tracing::info!("PVZ server stopped");
    Ok(())
}

fn check_config(config: &AppConfig, args: &CliArgs) -> Result<()> {
    tracing::info!("Checking configuration…");
    auth_settings(config)?;
    let module_config: PvzServiceConfig = config.module_config(MODULE_NAME)?;
    anyhow::ensure!(
        module_config.default_page_limit >= 1
            && module_config.default_page_limit <= module_config.max_page_limit,
        "modules.{MODULE_NAME}: default_page_limit must be within 1..={}",
        module_config.max_page_limit
    );
    if !args.mock {
        database_config(config)?.resolve_dsn()?;
    }
    if let Some(grpc_config) = &config.grpc {
        GrpcHub::new(grpc_config.clone()).listen_addr()?;
    }
    println!("Configuration is valid");
    Ok(())
}

fn auth_settings(config: &AppConfig) -> Result<AuthSettings> {
    Ok(AuthSettings {
        jwt_secret: config.auth.resolve_secret()?,
        token_ttl: config.auth.token_ttl,
    })
}

fn database_config(config: &AppConfig) -> Result<&pvz_bootstrap::DatabaseConfig> {
    config
        .database
        .as_ref()
        .context("no database section configured; pass --mock to run on in-memory storage")
}

async fn open_storage(config: &AppConfig, mock: bool) -> Result<Storage> {
    if mock {
        tracing::info!("Mock mode enabled: using in-memory storage");
        return Ok(Storage::in_memory());
    }

    let db = database_config(config)?;
    let dsn = db.resolve_dsn()?;
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .acquire_timeout(db.acquire_timeout)
        .connect(&dsn)
        .await
        .with_context(|| {
            format!(
                "failed to connect to {}",
                pvz_bootstrap::redact_dsn(&dsn)
            )
        })?;
    postgres::migrate(&pool).await?;
    tracing::info!(max_connections = db.max_connections, "PostgreSQL storage ready");
    Ok(Storage::postgres(pool))
}
