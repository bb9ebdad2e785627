// MBTA commuter rail departure board
// Serves the North Station and South Station boards plus a small JSON API

use actix_cors::Cors;
use actix_files as fs;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use chrono::Utc;
use clap::Parser;
use log::{error, info, LevelFilter};
use serde::Serialize;
use simple_logger::SimpleLogger;
use std::sync::Arc;

mod board;
mod config;
mod departures;
mod error;
mod mbta_api_models;
mod service;

use board::{DepartureBoard, STATIONS};
use config::Config;
use departures::Departure;
use service::{DepartureSource, FixtureSource, MbtaClient};

#[derive(Clone)]
struct AppState {
    live: Arc<dyn DepartureSource>,
    demo: Arc<dyn DepartureSource>,
    demo_error: Arc<dyn DepartureSource>,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    warning: Option<String>,
    timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T, warning: Option<String>) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            warning,
            timestamp: Utc::now().timestamp(),
        }
    }

    fn error(message: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            warning: None,
            timestamp: Utc::now().timestamp(),
        }
    }
}

// ============================================================================
// Board Pages
// ============================================================================

/// Fetches every station board at once; each fetch runs on the blocking pool.
async fn fetch_boards(source: Arc<dyn DepartureSource>) -> Vec<DepartureBoard> {
    let handles: Vec<_> = STATIONS
        .iter()
        .map(|&(title, stop_id)| {
            let source = source.clone();
            tokio::task::spawn_blocking(move || {
                DepartureBoard::from_result(title, source.list_departures(stop_id))
            })
        })
        .collect();

    let mut boards = Vec::with_capacity(handles.len());
    for (handle, (title, stop_id)) in handles.into_iter().zip(STATIONS) {
        match handle.await {
            Ok(board) => boards.push(board),
            Err(e) => {
                error!("Board task for {} panicked: {}", stop_id, e);
                boards.push(DepartureBoard {
                    title: title.to_string(),
                    departures: Vec::new(),
                    error: Some("Departures are unavailable right now".to_string()),
                    warning: None,
                });
            }
        }
    }
    boards
}

async fn render(source: Arc<dyn DepartureSource>) -> HttpResponse {
    let boards = fetch_boards(source).await;
    let updated_at = board::format_updated_at(Utc::now());

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(board::render_page(&boards, &updated_at))
}

async fn serve_index(state: web::Data<AppState>) -> HttpResponse {
    render(state.live.clone()).await
}

async fn serve_test(state: web::Data<AppState>) -> HttpResponse {
    render(state.demo.clone()).await
}

async fn serve_test_error(state: web::Data<AppState>) -> HttpResponse {
    render(state.demo_error.clone()).await
}

// ============================================================================
// API Endpoints
// ============================================================================

async fn get_departures(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let stop_id = path.into_inner();
    let source = state.live.clone();

    let lookup_id = stop_id.clone();
    match tokio::task::spawn_blocking(move || source.list_departures(&lookup_id)).await {
        Ok(Ok(extraction)) => {
            let warning = extraction.parse_errors.map(|e| e.to_string());
            HttpResponse::Ok().json(ApiResponse::success(extraction.departures, warning))
        }
        Ok(Err(e)) => {
            error!("Departures for {} unavailable: {}", stop_id, e);
            HttpResponse::BadGateway().json(ApiResponse::<Vec<Departure>>::error(e.to_string()))
        }
        Err(e) => {
            error!("Departure task for {} panicked: {}", stop_id, e);
            HttpResponse::InternalServerError().json(ApiResponse::<Vec<Departure>>::error(
                "Departure lookup failed".to_string(),
            ))
        }
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "MBTA Commuter Rail Departure Board",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().timestamp(),
    }))
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(serve_index))
        .route("/test", web::get().to(serve_test))
        .route("/testerror", web::get().to(serve_test_error))
        .route("/health", web::get().to(health_check))
        .route("/api/departures/{stop_id}", web::get().to(get_departures));
}

// ============================================================================
// Server Setup
// ============================================================================

async fn run_server(config: Config, state: AppState) -> std::io::Result<()> {
    info!("Listening on http://{}:{}", config.bind, config.port);
    info!("Upstream API: {}", config.base_url);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes)
            .service(fs::Files::new("/static", "static"))
    })
    .bind((config.bind.as_str(), config.port))?
    .run()
    .await
}

fn main() -> std::io::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .map_err(std::io::Error::other)?;

    let config = Config::parse();
    let options = config.extract_options();
    if let Some(direction) = &options.direction {
        info!("Only showing {} trips", direction);
    }

    let live = match MbtaClient::new(config.service_config(), options.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState {
        live: Arc::new(live),
        demo: Arc::new(FixtureSource::new(
            config.fixtures_dir.join("predictions-delayed.json"),
            options.clone(),
        )),
        demo_error: Arc::new(FixtureSource::new(
            config.fixtures_dir.join("error-429.json"),
            options,
        )),
    };

    actix_web::rt::System::new().block_on(run_server(config, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use departures::ExtractOptions;
    use std::path::PathBuf;

    fn fixture_source(name: &str) -> Arc<dyn DepartureSource> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name);
        Arc::new(FixtureSource::new(path, ExtractOptions::default()))
    }

    fn test_state() -> AppState {
        AppState {
            live: fixture_source("predictions.json"),
            demo: fixture_source("predictions-delayed.json"),
            demo_error: fixture_source("error-429.json"),
        }
    }

    #[actix_web::test]
    async fn test_page_renders_both_boards() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/test").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let html = String::from_utf8(body.to_vec()).unwrap();

        assert!(html.contains("North Station Information"));
        assert!(html.contains("South Station Information"));
        assert!(html.contains("Delayed"));
        assert!(html.contains("(Parse Error) 2023-01-01 17:45"));
    }

    #[actix_web::test]
    async fn error_page_shows_upstream_message() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/testerror").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let html = String::from_utf8(body.to_vec()).unwrap();

        assert!(html.contains("MBTA API error: You have exceeded your allowed usage rate."));
        assert!(!html.contains("<table>"));
    }

    #[actix_web::test]
    async fn api_returns_departure_rows() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/departures/place-sstat")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["success"], true);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(5));
        assert_eq!(body["data"][0]["time_label"], "11:50AM");
        assert_eq!(body["data"][0]["track"], "10");
        assert!(body["warning"].is_null());
    }

    #[actix_web::test]
    async fn api_reports_upstream_failure() {
        let state = AppState {
            live: fixture_source("error-429.json"),
            ..test_state()
        };
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/departures/place-north")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_GATEWAY);
    }
}
