//! Streaming brute-force optimization over WebSocket.
//!
//! Protocol: the client's first frame is a `BucketOptimizeRequest`; the
//! server then emits `progress` frames while the refiner runs and finishes
//! with exactly one terminal frame, either `result` or `error`. The client
//! may send `{"type":"stop"}` at any time; a stopped run terminates with
//! `{"type":"error","message":"optimization cancelled"}` and never leaks a
//! partial weight vector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    response::Response,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::optimizer::{optimize_response, save_and_invalidate, BucketOptimizeRequest};
use crate::api::AppState;
use crate::error::OptimizerError;
use crate::optimizer::brute_force::PROGRESS_CHANNEL_CAPACITY;
use crate::optimizer::{BruteForceOptimizer, BruteForceProgress};

/// GET /api/optimizer/:mode/optimize-stream (WebSocket upgrade)
pub async fn get_optimize_stream(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_stream(socket, state, mode))
}

async fn send_json(socket: &mut WebSocket, value: Value) -> bool {
    let text = value.to_string();
    socket.send(Message::Text(text)).await.is_ok()
}

async fn send_error(socket: &mut WebSocket, message: impl Into<String>) {
    let _ = send_json(
        socket,
        json!({ "type": "error", "message": message.into() }),
    )
    .await;
}

fn progress_frame(progress: &BruteForceProgress) -> Value {
    let mut frame = json!(progress);
    frame["type"] = json!("progress");
    frame
}

async fn run_stream(mut socket: WebSocket, state: AppState, mode: String) {
    // First frame carries the optimizer config.
    let request: BucketOptimizeRequest = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                Ok(request) => break request,
                Err(e) => {
                    send_error(&mut socket, format!("invalid request: {e}")).await;
                    return;
                }
            },
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return,
        }
    };

    let table = match state.loader.get_mode(&mode) {
        Ok(table) => table,
        Err(e) => {
            send_error(&mut socket, e.to_string()).await;
            return;
        }
    };

    // The stream endpoint runs at higher precision by default.
    let (request, buckets) = match request.resolve(&table, 0.0001) {
        Ok(resolved) => resolved,
        Err(e) => {
            send_error(&mut socket, e.to_string()).await;
            return;
        }
    };

    let config = request.to_config(buckets.clone());
    if let Err(e) = config.validate() {
        send_error(&mut socket, e.to_string()).await;
        return;
    }

    let stop = Arc::new(AtomicBool::new(false));
    let (progress_tx, mut progress_rx) =
        mpsc::channel::<BruteForceProgress>(PROGRESS_CHANNEL_CAPACITY);

    let worker_table = table.clone();
    let worker_stop = stop.clone();
    let mut worker = tokio::task::spawn_blocking(move || {
        let optimizer =
            BruteForceOptimizer::with_stop(config, Some(progress_tx), Some(worker_stop));
        optimizer.optimize_table(&worker_table)
    });

    info!(%mode, target_rtp = request.target_rtp, "optimize stream started");
    let mut client_gone = false;

    loop {
        tokio::select! {
            Some(progress) = progress_rx.recv() => {
                if !send_json(&mut socket, progress_frame(&progress)).await {
                    // Client went away; let the worker notice the stop flag.
                    stop.store(true, Ordering::Relaxed);
                    client_gone = true;
                }
            }

            joined = &mut worker => {
                // Flush progress that raced the result.
                while let Ok(progress) = progress_rx.try_recv() {
                    if !client_gone {
                        let _ = send_json(&mut socket, progress_frame(&progress)).await;
                    }
                }

                match joined {
                    Ok(Ok(result)) => {
                        let save_info = if request.save_to_file {
                            match save_and_invalidate(
                                &state,
                                &mode,
                                &result.result.new_weights,
                                request.create_backup,
                            ) {
                                Ok(info) => Some(info),
                                Err(e) => {
                                    send_error(&mut socket, format!("save failed: {e}")).await;
                                    return;
                                }
                            }
                        } else {
                            None
                        };

                        let body = optimize_response(
                            &table,
                            &request,
                            &buckets,
                            &result.result,
                            Some(&result),
                            save_info,
                        );
                        let _ = send_json(
                            &mut socket,
                            json!({ "type": "result", "result": body }),
                        )
                        .await;
                        info!(
                            %mode,
                            iterations = result.iterations,
                            converged = result.result.converged,
                            "optimize stream complete"
                        );
                    }
                    Ok(Err(OptimizerError::Cancelled)) => {
                        send_error(&mut socket, "optimization cancelled").await;
                        info!(%mode, "optimize stream cancelled");
                    }
                    Ok(Err(e)) => {
                        send_error(&mut socket, e.to_string()).await;
                    }
                    Err(join_err) => {
                        warn!(%mode, error = %join_err, "optimizer task panicked");
                        send_error(&mut socket, "optimizer task failed").await;
                    }
                }
                return;
            }

            incoming = socket.recv(), if !client_gone => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let is_stop = serde_json::from_str::<Value>(&text)
                            .ok()
                            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
                            .is_some_and(|t| t == "stop");
                        if is_stop {
                            debug!(%mode, "stop requested");
                            stop.store(true, Ordering::Relaxed);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        stop.store(true, Ordering::Relaxed);
                        client_gone = true;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) => {
                        stop.store(true, Ordering::Relaxed);
                        client_gone = true;
                    }
                }
            }
        }
    }
}
