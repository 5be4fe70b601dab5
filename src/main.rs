use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::sync::Arc;

use tollgate::middleware::CostAccounting;
use tollgate::routing_config::GatewayConfig;
use tollgate::server::config_routes;
use tollgate::util::{cors_config_from_env, env_bind_addr, init_tracing, AppState};

/// Cost-aware routing gateway for local text-generation backends.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Args {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// Path to a JSON gateway config file.
    #[arg(long, env = "TOLLGATE_CONFIG")]
    config: Option<String>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = GatewayConfig::resolve(args.config.as_deref())?;
    let state = web::Data::new(AppState::new(config));

    let bind = args.bind.unwrap_or_else(env_bind_addr);
    tracing::info!(
        bind = %bind,
        log_path = %state.config.log_path.display(),
        "starting tollgate"
    );

    let mw_config = Arc::clone(&state.config);
    let mw_accounting = Arc::clone(&state.accounting);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(CostAccounting::new(
                Arc::clone(&mw_config),
                Arc::clone(&mw_accounting),
            ))
            .wrap(cors_config_from_env())
            .configure(config_routes)
    })
    .bind(&bind)?
    .run()
    .await?;

    Ok(())
}
