use std::{process, sync::Arc};

use curio::{
    application::{
        error::AppError,
        listing::{ListingConfig, ListingService},
        repos::{ContentRepo, MembershipRepo},
    },
    cache::{CacheConfig, CacheCoordinator, GroupMembershipCache, KeySpace},
    config::{self, InvalidateTarget},
    domain::viewer::Viewer,
    infra::{cache as cache_infra, db::PostgresRepositories, error::InfraError, telemetry},
};
use curio_api_types::FilterSpec;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %report.chain(), source = report.source, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report.chain(), source = report.source, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let repositories = init_repositories(&settings).await?;
    let service = build_listing_service(&settings, &repositories).await?;

    let result = match cli_args.command {
        config::Command::List(args) => run_list(&service, args).await,
        config::Command::Invalidate(args) => run_invalidate(&service, args.target).await,
    };

    repositories.close().await;
    result
}

async fn init_repositories(settings: &config::Settings) -> Result<PostgresRepositories, AppError> {
    let database_url = settings.database.url.as_deref().ok_or_else(|| {
        AppError::from(InfraError::configuration(
            "database.url must be set (config file, CURIO__DATABASE__URL, or --database-url)",
        ))
    })?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(InfraError::from)?;

    let repositories =
        PostgresRepositories::new(pool).with_statement_timeout(settings.database.statement_timeout);
    repositories
        .health_check()
        .await
        .map_err(InfraError::from)?;

    info!(
        target = "curio::bootstrap",
        max_connections = settings.database.max_connections.get(),
        "Database connected"
    );
    Ok(repositories)
}

async fn build_listing_service(
    settings: &config::Settings,
    repositories: &PostgresRepositories,
) -> Result<ListingService, AppError> {
    let store = cache_infra::open_store(&settings.cache).await?;
    let cache_config = CacheConfig::from(&settings.cache);

    let content: Arc<dyn ContentRepo> = Arc::new(repositories.clone());
    let membership_repo: Arc<dyn MembershipRepo> = Arc::new(repositories.clone());

    let memberships = Arc::new(GroupMembershipCache::new(
        store.clone(),
        membership_repo,
        KeySpace::new(cache_config.namespace.clone()),
        cache_config.membership_ttl(),
    ));
    let coordinator = Arc::new(CacheCoordinator::new(store, cache_config));

    Ok(ListingService::new(
        content,
        memberships,
        coordinator,
        ListingConfig::from(&settings.listing),
    ))
}

async fn run_list(service: &ListingService, args: config::ListArgs) -> Result<(), AppError> {
    let spec: FilterSpec = match args.filter.as_deref() {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|err| AppError::validation(format!("--filter is not a JSON object: {err}")))?,
        None => FilterSpec::default(),
    };
    let viewer = Viewer::from_token(args.viewer_id, &args.role);

    let response = service.list(&viewer, &spec).await?;
    let rendered = serde_json::to_string_pretty(&response)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}

async fn run_invalidate(
    service: &ListingService,
    target: InvalidateTarget,
) -> Result<(), AppError> {
    let removed = match target {
        InvalidateTarget::All => service.invalidate_all().await,
        InvalidateTarget::Item { id } => service.invalidate_by_item(id).await,
        InvalidateTarget::Series { id } => service.invalidate_by_series(id).await,
        InvalidateTarget::Author { id } => service.invalidate_by_author(id).await,
        InvalidateTarget::UserGroups { id } => u64::from(service.invalidate_user_groups(id).await),
    };

    info!(target = "curio::invalidate", removed, "Invalidation finished");
    println!("{removed}");
    Ok(())
}
