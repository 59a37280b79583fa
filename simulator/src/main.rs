mod devices;
mod service;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use clap::Parser;
use service::{Directory, Rejection};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};

/// Stand-in for the device location service, for local runs of the locator
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = "SIM_ADDR", default_value = "127.0.0.1:8080")]
    addr: String,

    /// Comma separated account names
    #[arg(long, env = "SIM_ACCOUNTS", value_delimiter = ',', default_value = "alice,bob")]
    accounts: Vec<String>,

    /// Devices per account
    #[arg(long, env = "SIM_DEVICES", default_value_t = 2)]
    devices: usize,

    /// Password accepted for every account
    #[arg(long, env = "SIM_PASSWORD", default_value = "secret")]
    password: String,
}

type SharedDirectory = Arc<Mutex<Directory>>;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting location service simulator");
    info!(
        "Address: {}, Accounts: {:?}, Devices per account: {}",
        args.addr, args.accounts, args.devices
    );

    let directory = Directory::new(
        &mut rand::thread_rng(),
        &args.accounts,
        args.devices,
        args.password,
    );
    let state: SharedDirectory = Arc::new(Mutex::new(directory));

    let app = Router::new()
        .route("/fmipservice/device/:login/:action", post(locate))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&args.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", args.addr, e);
            std::process::exit(1);
        }
    };

    info!("Listening on http://{}", args.addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("HTTP server error: {}", e);
    }
}

async fn locate(
    State(state): State<SharedDirectory>,
    Path((login, action)): Path<(String, String)>,
    auth: Option<TypedHeader<Authorization<Basic>>>,
) -> Response {
    let Some(TypedHeader(Authorization(basic))) = auth else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();

    let Ok(mut directory) = state.lock() else {
        error!("Directory lock poisoned");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let mut rng = rand::thread_rng();

    let result = match action.as_str() {
        "initClient" => directory.init_client(&mut rng, &login, basic.username(), basic.password(), now_ms),
        "refreshClient" => {
            directory.refresh_client(&mut rng, &login, basic.username(), basic.password(), now_ms)
        }
        _ => Err(Rejection::NotFound),
    };

    match result {
        Ok(body) => Json(body).into_response(),
        Err(Rejection::Unauthorized) => StatusCode::UNAUTHORIZED.into_response(),
        Err(Rejection::NotFound) => StatusCode::NOT_FOUND.into_response(),
    }
}
