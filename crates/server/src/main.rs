use clap::{Parser, Subcommand};
use drivelog::collaborators::{
    GeofenceStore, InMemoryGeofenceStore, InMemoryVehicleStore, NullGeocoder, NullRoadSnapper, ReverseGeocoder, RoadSnapper,
    UpstreamProvider, VehicleStore,
};
use drivelog::store::{ConnectionStore, EventStore, InMemoryEventStore, InMemoryTripStore, TripStore};
use drivelog::{Dispatcher, Reaper, Reconstructor, StateMachine, TripWriter};
use drivelog_server::collaborators_http::{HttpGeocoder, HttpRoadSnapper, HttpUpstreamProvider};
use drivelog_server::{http::router, AppState, ServerConfig};
use drivelog_types::EngineConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion server and its background supervisor loops.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        #[arg(long, env = "DRIVELOG_SHARED_SECRET")]
        shared_secret: Option<String>,
        /// Append-only event log path. Without it, events live in memory only.
        #[arg(long)]
        event_log: Option<String>,
        #[arg(long)]
        geocode_url: Option<String>,
        #[arg(long)]
        snap_url: Option<String>,
        #[arg(long)]
        upstream_url: Option<String>,
    },
    /// Reconstruct trips for one VIN from raw telemetry history and exit.
    Reconstruct {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        vin: String,
        #[arg(long, default_value_t = 24)]
        since_hours: u64,
        #[arg(long)]
        event_log: Option<String>,
        #[arg(long)]
        geocode_url: Option<String>,
    },
}

fn open_event_store(path: Option<&str>) -> anyhow::Result<Arc<dyn EventStore>> {
    match path {
        #[cfg(feature = "aof")]
        Some(path) => {
            info!("opening event log at {path}");
            Ok(Arc::new(drivelog::store::PersistentEventStore::open(path)?))
        }
        #[cfg(not(feature = "aof"))]
        Some(_) => {
            anyhow::bail!("--event-log requires the drivelog `aof` feature");
        }
        None => {
            info!("running with an in-memory event store");
            Ok(Arc::new(InMemoryEventStore::new()))
        }
    }
}

fn build_geocoder(url: Option<String>) -> Arc<dyn ReverseGeocoder> {
    match url {
        Some(url) => Arc::new(HttpGeocoder::new(url)),
        None => Arc::new(NullGeocoder),
    }
}

fn build_snapper(url: Option<String>) -> Arc<dyn RoadSnapper> {
    match url {
        Some(url) => Arc::new(HttpRoadSnapper::new(url)),
        None => Arc::new(NullRoadSnapper),
    }
}

fn build_upstream(url: Option<String>) -> Option<Arc<dyn UpstreamProvider>> {
    url.map(|url| Arc::new(HttpUpstreamProvider::new(url)) as Arc<dyn UpstreamProvider>)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "drivelog_server=info,drivelog=info,info".into()))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Serve { bind, shared_secret, event_log, geocode_url, snap_url, upstream_url } => {
            let config = ServerConfig {
                bind_addr: bind,
                shared_secret,
                event_log_path: event_log,
                geocode_base_url: geocode_url,
                snap_base_url: snap_url,
                upstream_base_url: upstream_url,
                engine: EngineConfig::default(),
            };
            serve(config).await
        }
        Command::Reconstruct { user_id, vin, since_hours, event_log, geocode_url } => {
            reconstruct(user_id, vin, since_hours, event_log, geocode_url).await
        }
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let ServerConfig {
        bind_addr,
        shared_secret,
        event_log_path,
        geocode_base_url,
        snap_base_url,
        upstream_base_url,
        engine: engine_config,
    } = config;

    let event_store = open_event_store(event_log_path.as_deref())?;
    let connection_store = Arc::new(ConnectionStore::new());
    let vehicle_store: Arc<dyn VehicleStore> = Arc::new(InMemoryVehicleStore::new());
    let geofence_store: Arc<dyn GeofenceStore> = Arc::new(InMemoryGeofenceStore::new());
    let trip_store: Arc<dyn TripStore> = Arc::new(InMemoryTripStore::new());

    let geocoder = build_geocoder(geocode_base_url);
    let snapper = build_snapper(snap_base_url);
    let upstream = build_upstream(upstream_base_url);

    let writer = Arc::new(TripWriter::new(trip_store.clone(), vehicle_store.clone(), geofence_store, geocoder.clone(), snapper));
    let state_machine = Arc::new(StateMachine::new(writer.clone(), geocoder.clone(), vehicle_store.clone(), engine_config.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        event_store.clone(),
        connection_store.clone(),
        vehicle_store.clone(),
        state_machine.clone(),
        engine_config.clone(),
    ));
    let reaper = Arc::new(Reaper::new(connection_store.clone(), event_store.clone(), state_machine, engine_config.clone()));
    let reconstructor = Arc::new(Reconstructor::new(event_store.clone(), trip_store, vehicle_store.clone(), geocoder, writer));

    let state = Arc::new(AppState {
        event_store,
        connection_store,
        vehicle_store,
        dispatcher,
        reaper,
        reconstructor,
        upstream,
        shared_secret,
    });

    let token = CancellationToken::new();
    let loops = drivelog_server::supervisor::spawn_all(state.clone(), engine_config, token.clone());

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.expect("failed to listen for ctrl_c signal");
        })
        .await?;

    token.cancel();
    for handle in loops {
        let _ = handle.await;
    }

    Ok(())
}

async fn reconstruct(user_id: String, vin: String, since_hours: u64, event_log: Option<String>, geocode_url: Option<String>) -> anyhow::Result<()> {
    let event_store = open_event_store(event_log.as_deref())?;
    let vehicle_store: Arc<dyn VehicleStore> = Arc::new(InMemoryVehicleStore::new());
    let geofence_store: Arc<dyn GeofenceStore> = Arc::new(InMemoryGeofenceStore::new());
    let trip_store: Arc<dyn TripStore> = Arc::new(InMemoryTripStore::new());
    let geocoder = build_geocoder(geocode_url);

    let writer = Arc::new(TripWriter::new(
        trip_store.clone(),
        vehicle_store.clone(),
        geofence_store,
        geocoder.clone(),
        Arc::new(NullRoadSnapper),
    ));
    let reconstructor = Reconstructor::new(event_store, trip_store, vehicle_store, geocoder, writer);

    let report = reconstructor.reconstruct(&user_id, &vin, since_hours).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!("reconstructed {} trip(s) for vin {vin}", report.trips_created);

    Ok(())
}
