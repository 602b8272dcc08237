use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use actix_web_prom::PrometheusMetricsBuilder;
use index_controller::client::HttpControlPlane;
use index_controller::errors::Error;
use index_controller::state::FileStateStore;
use index_controller::{init_controller, metrics, views, Config, EnvironmentConfig};
use log::{debug, info, warn};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;

#[actix_rt::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let env_config = EnvironmentConfig::from_env()?;
    debug!("Environment config loaded, API URL: {}", env_config.api_url);
    let config = Config::from_env_config(env_config)?;
    info!(
        "Starting with manifest {}, state file {}, resync every {:?}",
        config.manifest.display(),
        config.state_file.display(),
        config.resync_interval
    );

    let bind_address = format!("{}:{}", &config.server_host, config.server_port);

    let client = HttpControlPlane::new(&config.api_url, &config.api_key)
        .map_err(|err| Error::Config(format!("Unable to build control plane client: {}", err)))?;
    let state = FileStateStore::open(&config.state_file).await?;

    let cancel = CancellationToken::new();
    let controller = init_controller(Arc::new(client), Arc::new(state), &config, cancel.clone()).await;

    let registry = Registry::new();
    metrics::custom_metrics(&registry)
        .map_err(|err| Error::Config(format!("Unable to register metrics: {}", err)))?;
    let prometheus = PrometheusMetricsBuilder::new(metrics::METRICS_NAMESPACE)
        .registry(registry)
        .endpoint("/metrics")
        .build()
        .map_err(|err| Error::Config(format!("Unable to build metrics middleware: {}", err)))?;

    let data = web::Data::new(controller);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(prometheus.clone())
            .wrap(middleware::Logger::default().exclude("/health").exclude("/metrics"))
            .wrap(middleware::Compress::default())
            .configure(views::configure)
    })
    .bind(&bind_address)?
    .run();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("Received shutdown signal, cancelling in-flight waits");
            cancel.cancel();
        }
        result = server => {
            info!("actix exited");
            result?;
        }
    }
    Ok(())
}
