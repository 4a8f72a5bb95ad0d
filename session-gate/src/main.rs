//! Login session gate
//!
//! Keeps login states on behalf of clients and tells whether their access tokens may still be
//! used.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer};
use clap::Parser;
use color_eyre::Result;
use std::io::read_to_string;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;

use crate::config::{Config, LogFormat};
use crate::model::Model;
use crate::model::clock::{Clock, SystemClock};
use crate::opt::Opt;

mod config;
pub mod model;
mod mutation;
mod opt;
mod query;
mod service;

/// Initializes tracing collection
fn setup_tracing(config: config::Logging) -> Result<()> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    let filter_layer =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let filter_layer = config
        .filters
        .into_iter()
        .fold(filter_layer, |layer, filter| layer.add_directive(filter));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

/// Periodically removes sessions that can't be used anymore
async fn cleanup_loop(model: Model, interval: Duration, retention: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match model.cleanup(retention).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed unusable login sessions"),
            Err(err) => error!(%err, "Login sessions cleanup failed"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let Opt {
        config: mut config_file,
    } = Opt::parse();

    let config = read_to_string(&mut config_file)?;
    let config: Config = toml::from_str(&config)?;

    setup_tracing(config.logging)?;
    color_eyre::install()?;

    info!(
        config = ?config_file.path().path(),
        "Tracing initialized, setting up a service"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let model = Model::with_config(config.db, clock).await?;

    let cleanup = tokio::spawn(cleanup_loop(
        model.clone(),
        config.cleanup.interval(),
        config.cleanup.retention(),
    ));

    let service_config = service::configure(config.graphiql, model);
    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .configure(service_config.clone())
    })
    .bind(config.host)?
    .run()
    .await?;

    cleanup.abort();
    info!("Service stopped, tearing down");
    Ok(())
}
