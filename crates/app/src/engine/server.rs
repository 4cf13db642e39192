//! Actix Web command and telemetry server.
//!
//! Runs on a dedicated thread so the tick and command threads never touch the
//! Actix runtime. Commands are validated here and forwarded to the router;
//! telemetry streams read from per-connection publisher subscriptions.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::engine::{
    protocol::{Command, CommandRequest, CommandResponse},
    publisher::Publisher,
    router::{REQUEST_TIMEOUT, RouterHandle},
    schema::{TelemetryFrame, length_prefixed},
    telemetry,
};

const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) router: RouterHandle,
    pub(crate) publisher: Arc<Publisher>,
}

#[derive(Default)]
/// Handle for the server thread.
pub(crate) struct CommandServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl CommandServer {
    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(self) {
        if let Some(tx) = self.shutdown {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle {
            let _ = handle.join();
        }
    }
}

/// Spawn the server thread and return a handle that can stop it.
pub(crate) fn spawn_command_server(
    addr: SocketAddr,
    router: RouterHandle,
    publisher: Arc<Publisher>,
) -> Result<CommandServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = telemetry::spawn_thread("engine-http", move || {
        if let Err(err) = actix_web::rt::System::new().block_on(async move {
            let state = web::Data::new(ServerState { router, publisher });
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(state.clone())
                    .route("/command", web::post().to(command_handler))
                    .route("/snapshot", web::get().to(snapshot_handler))
                    .route("/telemetry", web::get().to(telemetry_sse_handler))
                    .route("/telemetry.bin", web::get().to(telemetry_bin_handler))
                    .route("/metrics", web::get().to(metrics_handler))
            })
            .workers(2)
            .bind(addr)?
            .run();
            info!("command server listening on http://{addr}");

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        }) {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn command server thread")?;
    Ok(CommandServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

/// Parse and validate a JSON command, then wait for the router's answer.
async fn command_handler(body: Bytes, state: web::Data<ServerState>) -> HttpResponse {
    let request: CommandRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return HttpResponse::BadRequest()
                .json(CommandResponse::fail(format!("malformed command: {err}")));
        }
    };
    let command = match Command::try_from(request) {
        Ok(command) => command,
        Err(err) => {
            warn!("rejected command: {err}");
            return HttpResponse::BadRequest().json(CommandResponse::fail(err.to_string()));
        }
    };

    let router = state.router.clone();
    match web::block(move || router.request(command, REQUEST_TIMEOUT)).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(err) => HttpResponse::InternalServerError().json(CommandResponse::fail(err.to_string())),
    }
}

/// Latest telemetry record as JSON.
async fn snapshot_handler(state: web::Data<ServerState>) -> HttpResponse {
    match state.publisher.latest() {
        Some(snapshot) => HttpResponse::Ok().json(TelemetryFrame::from(snapshot.as_ref())),
        None => HttpResponse::NoContent().finish(),
    }
}

/// Length-prefixed bincode frames, one per tick.
async fn telemetry_bin_handler(state: web::Data<ServerState>) -> HttpResponse {
    let rx = state.publisher.subscribe();
    debug!(
        subscribers = state.publisher.subscriber_count(),
        "binary telemetry subscriber connected"
    );
    let stream = stream! {
        let mut interval = actix_web::rt::time::interval(STREAM_POLL_INTERVAL);
        loop {
            interval.tick().await;
            for message in rx.try_iter() {
                if message.encoded.is_empty() {
                    continue;
                }
                yield Ok::<Bytes, actix_web::Error>(Bytes::from(length_prefixed(&message.encoded)));
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header(("Cache-Control", "no-cache"))
        .content_type("application/octet-stream")
        .streaming(stream)
}

/// The same frames as Server-Sent Events carrying JSON.
async fn telemetry_sse_handler(state: web::Data<ServerState>) -> HttpResponse {
    let rx = state.publisher.subscribe();
    debug!(
        subscribers = state.publisher.subscriber_count(),
        "SSE telemetry subscriber connected"
    );
    let stream = stream! {
        yield Ok::<Bytes, actix_web::Error>(Bytes::from_static(b"retry: 500\n\n"));
        let mut interval = actix_web::rt::time::interval(STREAM_POLL_INTERVAL);
        loop {
            interval.tick().await;
            for message in rx.try_iter() {
                match serde_json::to_string(&message.frame) {
                    Ok(json) => {
                        let chunk = format!("id: {}\ndata: {json}\n\n", message.frame.frame_number);
                        yield Ok::<Bytes, actix_web::Error>(Bytes::from(chunk));
                    }
                    Err(err) => {
                        let chunk = format!("event: error\ndata: {err}\n\n");
                        yield Ok::<Bytes, actix_web::Error>(Bytes::from(chunk));
                    }
                }
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "text/event-stream"))
        .append_header(("Connection", "keep-alive"))
        .streaming(stream)
}

async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{body::to_bytes, test};

    use super::*;
    use crate::engine::{
        data::fixtures::{observation, snapshot},
        host::testing::counting_host,
        router::CommandRouter,
    };

    fn state() -> (web::Data<ServerState>, CommandRouter, Arc<Publisher>) {
        let (host, _, _, _) = counting_host();
        let (router, handle) = CommandRouter::new(Arc::new(host));
        let publisher = Arc::new(Publisher::new());
        (
            web::Data::new(ServerState {
                router: handle,
                publisher: publisher.clone(),
            }),
            router,
            publisher,
        )
    }

    #[actix_web::test]
    async fn command_round_trip_through_router() {
        let (state, router, _) = state();
        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let worker = {
            let shutdown = shutdown.clone();
            std::thread::spawn(move || router.run(shutdown))
        };

        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/command", web::post().to(command_handler)),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/command")
            .set_payload(r#"{"type":"LOAD_MODULE","module_name":"counter_a"}"#)
            .to_request();
        let response: CommandResponse = test::call_and_read_body_json(&app, req).await;
        assert!(response.success, "{response:?}");

        let req = test::TestRequest::post()
            .uri("/command")
            .set_payload(r#"{"type":"LOAD_MODULE","module_name":"nope"}"#)
            .to_request();
        let response: CommandResponse = test::call_and_read_body_json(&app, req).await;
        assert!(!response.success);

        shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        worker.join().unwrap();
    }

    #[actix_web::test]
    async fn malformed_commands_never_reach_the_router() {
        let (state, router, _) = state();
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/command", web::post().to(command_handler)),
        )
        .await;

        for body in [
            "not json",
            r#"{"type":"SET_BRIGHTNESS","brightness_command":{"ball_id":"all","level":12}}"#,
        ] {
            let req = test::TestRequest::post()
                .uri("/command")
                .set_payload(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
            let bytes = to_bytes(resp.into_body()).await.unwrap();
            let parsed: CommandResponse = serde_json::from_slice(&bytes).unwrap();
            assert!(!parsed.success);
        }
        assert!(!router.poll_once());
    }

    #[actix_web::test]
    async fn snapshot_returns_latest_frame() {
        let (state, _router, publisher) = state();
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/snapshot", web::get().to(snapshot_handler)),
        )
        .await;

        let req = test::TestRequest::get().uri("/snapshot").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NO_CONTENT);

        publisher.publish(Arc::new(snapshot(vec![observation("green", [0.1, 0.2, 0.3])])));
        let req = test::TestRequest::get().uri("/snapshot").to_request();
        let frame: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(frame["schema_version"], 1);
        assert_eq!(frame["objects"][0]["label"], "green");
    }
}
