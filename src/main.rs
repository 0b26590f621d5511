use clap::Parser;
use eventbrite_etl::core::ConfigProvider;
use eventbrite_etl::domain::ports::{EventSource, Warehouse};
use eventbrite_etl::utils::error::ErrorSeverity;
use eventbrite_etl::utils::{logger, validation, validation::Validate};
use eventbrite_etl::{
    load_dotenv, Cli, Command, EtlError, EventbriteClient, EventbriteLoader, LoaderOptions,
    PgWarehouse, Result, Settings, TomlOverrides,
};

fn load_settings(cli: &Cli) -> Result<Settings> {
    if let Some(path) = load_dotenv(cli.env_file.as_deref())? {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let mut settings = Settings::from_env()?;

    if let Some(path) = &cli.config {
        tracing::info!("📁 Loading configuration from: {}", path.display());
        let overrides = TomlOverrides::from_file(path)?;
        overrides.validate()?;
        settings.apply_overrides(&overrides);
    }

    if let Command::Load {
        with_orders,
        no_throttle,
        ..
    } = &cli.command
    {
        if *with_orders {
            settings.loader.load_orders = true;
        }
        if *no_throttle {
            settings.loader.throttle_seconds = 0;
        }
    }

    settings.validate()?;
    Ok(settings)
}

async fn run_command(cli: &Cli, settings: &Settings) -> Result<()> {
    match &cli.command {
        Command::Load { start, .. } => {
            let source =
                EventbriteClient::new(settings.api_url(), settings.eventbrite.token.clone())?;
            let warehouse = PgWarehouse::connect(&settings.database).await?;
            let loader = EventbriteLoader::new(
                source,
                warehouse,
                settings.org_id(),
                LoaderOptions::from_config(settings),
            );

            let summary = loader.run(*start).await?;
            println!(
                "✅ Loaded {} events, {} venues, {} attendees, {} orders",
                summary.events, summary.venues, summary.attendees, summary.orders
            );
            if !summary.views_refreshed {
                println!("Nothing new to load; views were not refreshed");
            }
        }
        Command::RefreshViews => {
            let warehouse = PgWarehouse::connect(&settings.database).await?;
            warehouse.refresh_views().await?;
            println!("✅ Refreshed {} views", settings.materialized_views().len());
        }
        Command::Backup { table } => {
            validation::validate_identifier("table", table)?;
            let warehouse = PgWarehouse::connect(&settings.database).await?;
            warehouse.backup_table(table).await?;
            println!("✅ Backed up {}.{}", warehouse.schema(), table);
        }
        Command::Revert { table } => {
            validation::validate_identifier("table", table)?;
            let warehouse = PgWarehouse::connect(&settings.database).await?;
            warehouse.revert_table(table).await?;
            println!("✅ Reverted {}.{} from backup", warehouse.schema(), table);
        }
        Command::Truncate { table } => {
            validation::validate_identifier("table", table)?;
            let warehouse = PgWarehouse::connect(&settings.database).await?;
            warehouse.truncate_table(table).await?;
            println!("✅ Truncated {}.{}", warehouse.schema(), table);
        }
        Command::LastLoad => {
            let warehouse = PgWarehouse::connect(&settings.database).await?;
            match warehouse.last_event_load_date().await? {
                Some(ts) => println!("{}", ts.to_rfc3339()),
                None => println!("never"),
            }
        }
        Command::TokenInfo => {
            let source =
                EventbriteClient::new(settings.api_url(), settings.eventbrite.token.clone())?;
            let info = source.get_token_info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }
    Ok(())
}

fn exit_code(e: &EtlError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn report_failure(e: &EtlError) {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting eventbrite-etl");

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            report_failure(&e);
            std::process::exit(exit_code(&e));
        }
    };
    if cli.verbose {
        tracing::debug!("Settings: {:?}", settings);
    }

    if let Err(e) = run_command(&cli, &settings).await {
        report_failure(&e);
        let code = exit_code(&e);
        if code > 0 {
            std::process::exit(code);
        }
    }
}
