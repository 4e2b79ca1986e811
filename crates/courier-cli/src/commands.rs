use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use courier_core::config::{google_secret_path, load_discord_token, parse_timezone};
use courier_core::discord::DiscordChannel;
use courier_core::feed::HttpFeed;
use courier_core::google::{GoogleCalendar, ServiceAccountKey};
use courier_core::logging::{LoggingDestination, init_logging};
use courier_core::offline::{DryRunCalendar, DryRunChat};
use courier_core::{
    AclReport, AppPaths, CalendarBinding, CalendarService, ChatService, FileConfig, JsonStore,
    Ledger, PassReport, PassRunner, Reconciler, SeenRecord, TemporalExtractor, TriggerResult,
    load_config, provision_calendar, save_config, subscribe_link,
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli_args::{Cli, Command, ConfigCommand, ExtractArgs};

/// Everything resolved at startup and handed to the command being run.
struct Context {
    paths: AppPaths,
    config: FileConfig,
    dry_run: bool,
}

pub async fn dispatch(cli: Cli) -> Result<(), String> {
    let context = load_context(cli.config_dir, cli.dry_run)?;

    match cli.command {
        Command::Run => {
            start_logging(&context, true);
            run_forever(&context).await
        }
        Command::Once => {
            start_logging(&context, true);
            run_once(&context).await
        }
        Command::SyncAcl => {
            start_logging(&context, true);
            sync_acl(&context).await
        }
        Command::Extract(args) => {
            start_logging(&context, false);
            preview_extraction(&context, args)
        }
        Command::Config(ConfigCommand::Path) => {
            print_paths(&context);
            Ok(())
        }
        Command::Config(ConfigCommand::Init { force }) => init_config(&context, force),
    }
}

fn load_context(config_dir: Option<PathBuf>, dry_run: bool) -> Result<Context, String> {
    let paths = AppPaths::discover(config_dir);
    let load = load_config(&paths.config_file());
    for warning in &load.warnings {
        eprintln!("Warning: {warning}");
    }
    let paths = paths
        .with_storage(&load.config.storage)
        .map_err(|err| err.to_string())?;
    Ok(Context {
        paths,
        config: load.config,
        dry_run,
    })
}

fn start_logging(context: &Context, to_file: bool) {
    let destination = if to_file && !context.dry_run {
        LoggingDestination::FileAndStderr(context.paths.log_dir())
    } else {
        LoggingDestination::StderrOnly
    };
    if let Err(err) = init_logging(destination) {
        eprintln!("Warning: logging unavailable: {err}");
    }
}

fn chat_service(context: &Context) -> Result<Arc<dyn ChatService>, String> {
    if context.dry_run {
        return Ok(Arc::new(DryRunChat::new()));
    }
    let discord = &context.config.discord;
    if discord.channel_id.trim().is_empty() {
        return Err("discord.channel_id is not configured".to_string());
    }
    let token = load_discord_token(&context.paths).map_err(|err| err.to_string())?;
    let channel = DiscordChannel::new(&discord.api_base, token, &discord.channel_id)
        .map_err(|err| err.to_string())?;
    Ok(Arc::new(channel))
}

fn calendar_service(context: &Context) -> Result<Arc<dyn CalendarService>, String> {
    if context.dry_run {
        return Ok(Arc::new(DryRunCalendar::new()));
    }
    let key = ServiceAccountKey::from_file(&google_secret_path(&context.paths))
        .map_err(|err| err.to_string())?;
    let calendar = GoogleCalendar::with_service_account(key, &context.config.calendar.api_base)
        .map_err(|err| err.to_string())?;
    Ok(Arc::new(calendar))
}

/// Resolves the calendar to publish to, or `None` when calendars are off.
async fn calendar_binding(context: &Context) -> Result<Option<CalendarBinding>, String> {
    let section = &context.config.calendar;
    if !section.enabled {
        info!("Calendar publishing disabled");
        return Ok(None);
    }

    let service = calendar_service(context)?;
    let provisioned = provision(context, service.clone()).await?;
    print_acl_report(&provisioned.acl);

    Ok(Some(CalendarBinding {
        service,
        subscribe_link: Some(subscribe_link(&provisioned.calendar_id)),
        calendar_id: provisioned.calendar_id,
        timezone: section.timezone.clone(),
        event_duration: section.event_duration(),
    }))
}

async fn provision(
    context: &Context,
    service: Arc<dyn CalendarService>,
) -> Result<courier_core::ProvisionedCalendar, String> {
    let settings = context.config.calendar.settings();
    let mut state: JsonStore<String> = JsonStore::open(context.paths.calendar_state_file());
    let result = if context.dry_run {
        let mut scratch = state.detached();
        provision_calendar(service, &mut scratch, &settings).await
    } else {
        provision_calendar(service, &mut state, &settings).await
    };
    result.map_err(|err| err.to_string())
}

async fn build_runner(
    context: &Context,
    shutdown: watch::Receiver<bool>,
) -> Result<PassRunner, String> {
    let feed_section = &context.config.feed;
    if feed_section.url.trim().is_empty() {
        return Err("feed.url is not configured".to_string());
    }
    let feed = HttpFeed::new(&feed_section.url, &feed_section.user_agent)
        .map_err(|err| err.to_string())?;

    let chat = chat_service(context)?;
    let calendar = calendar_binding(context).await?;
    let extractor = TemporalExtractor::new(context.config.calendar.tz());
    let reconciler = Reconciler::new(extractor, calendar, chat);

    let store: JsonStore<SeenRecord> = JsonStore::open(context.paths.ledger_file());
    let ledger: Box<Ledger> = if context.dry_run {
        Box::new(store.detached())
    } else {
        Box::new(store)
    };

    Ok(PassRunner::new(Arc::new(feed), reconciler, ledger, shutdown))
}

async fn run_once(context: &Context) -> Result<(), String> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = build_runner(context, shutdown_rx).await?;
    match runner.trigger().await.map_err(|err| err.to_string())? {
        TriggerResult::Completed(reports) => {
            for report in &reports {
                print_pass_report(report);
            }
        }
        TriggerResult::Coalesced => println!("A pass was already running."),
    }
    Ok(())
}

async fn run_forever(context: &Context) -> Result<(), String> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = build_runner(context, shutdown_rx).await?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested; finishing the current entry");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => warn!(error = %err, "Could not listen for Ctrl-C"),
        }
    });

    let period = Duration::from_secs(context.config.feed.poll_interval_secs);
    info!(poll_interval_secs = period.as_secs(), "Watching feed");
    runner.run_forever(period).await;
    Ok(())
}

async fn sync_acl(context: &Context) -> Result<(), String> {
    if !context.config.calendar.enabled {
        return Err("calendar is disabled in the configuration".to_string());
    }
    let service = calendar_service(context)?;
    let provisioned = provision(context, service).await?;
    println!("Calendar: {}", provisioned.calendar_id);
    print_acl_report(&provisioned.acl);
    Ok(())
}

fn preview_extraction(context: &Context, args: ExtractArgs) -> Result<(), String> {
    let zone = match args.timezone.as_deref() {
        Some(name) => parse_timezone(name).map_err(|err| err.to_string())?,
        None => context.config.calendar.tz(),
    };
    let extraction = TemporalExtractor::new(zone).extract(&args.title, &args.body);

    println!("Title: {}", extraction.title);
    match extraction.parsed_time {
        Some(time) => println!("Time:  {}", time.to_rfc3339()),
        None => println!("Time:  (none found)"),
    }
    for (index, block) in extraction.content.iter().enumerate() {
        println!("Body[{index}]: {block}");
    }
    for failure in extraction.failures() {
        println!("Unparsed: {failure}");
    }
    Ok(())
}

fn print_paths(context: &Context) {
    let paths = &context.paths;
    println!("config file:    {}", paths.config_file().display());
    println!("state dir:      {}", paths.state_dir.display());
    println!("ledger:         {}", paths.ledger_file().display());
    println!("calendar state: {}", paths.calendar_state_file().display());
    println!("logs:           {}", paths.log_dir().display());
}

fn init_config(context: &Context, force: bool) -> Result<(), String> {
    let path = context.paths.config_file();
    if path.exists() && !force {
        return Err(format!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        ));
    }
    save_config(&path, &FileConfig::default()).map_err(|err| err.to_string())?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn print_pass_report(report: &PassReport) {
    println!(
        "Processed {}, unchanged {}, unresolved {}, failed {}{}",
        report.processed,
        report.unchanged,
        report.unresolved,
        report.failed,
        if report.cancelled { " (cancelled)" } else { "" }
    );
}

fn print_acl_report(report: &AclReport) {
    for update in &report.updated {
        println!(
            "updated  {} {} -> {}",
            update.rule.scope_key(),
            update.previous_role,
            update.rule.role
        );
    }
    for rule in &report.inserted {
        println!("inserted {} {}", rule.scope_key(), rule.role);
    }
    for extra in &report.extras {
        println!("kept     {} {} (unmanaged)", extra.scope_key(), extra.role);
    }
    if report.updated.is_empty() && report.inserted.is_empty() {
        println!("ACL already converged");
    }
}
