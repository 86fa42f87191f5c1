//! The HTTP surface: one catch-all route feeding the pipeline, plus the
//! prometheus scrape endpoint. Listener tuning beyond host and port is
//! out of scope here.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};
use warp::http::HeaderMap;
use warp::path::FullPath;
use warp::Filter;

use crate::error::Result;
use crate::exchange::{Method, Request, Response};
use crate::pipeline::Pipeline;
use crate::state::{GatewayState, RequestTimer};

pub async fn start_server(state: Arc<GatewayState>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port)
        .parse()
        .map_err(|e| {
            crate::error::ConfigError::Parse(format!("Invalid gateway address: {e}"))
        })?;

    info!("Gateway listening on {}", addr);

    let routes = routes(state.clone());

    let (_, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async move {
        let _ = state.shutdown_tx.subscribe().recv().await;
    });

    server.await;

    info!("Gateway stopped");
    Ok(())
}

fn routes(
    state: Arc<GatewayState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let metrics_state = state.clone();
    let metrics = warp::path("metrics")
        .and(warp::get())
        .map(move || render_metrics(&metrics_state));

    let gateway = warp::any()
        .and(warp::method())
        .and(warp::path::full())
        .and(
            warp::query::raw()
                .or_else(|_| async { Ok::<(String,), warp::Rejection>((String::new(),)) }),
        )
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and(warp::any().map(move || state.clone()))
        .and_then(handle_exchange);

    metrics.or(gateway)
}

fn render_metrics(state: &Arc<GatewayState>) -> impl warp::Reply {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.metrics.gather_metrics(), &mut buffer) {
        warn!("failed to encode metrics: {}", e);
    }
    warp::reply::with_header(buffer, "content-type", encoder.format_type().to_string())
}

async fn handle_exchange(
    method: warp::http::Method,
    path: FullPath,
    raw_query: String,
    headers: HeaderMap,
    body: Bytes,
    state: Arc<GatewayState>,
) -> std::result::Result<warp::http::Response<Vec<u8>>, Infallible> {
    let Some(method) = Method::parse(method.as_str()) else {
        return Ok(plain_reply(405, b"{\"status\":405,\"message\":\"method not allowed\"}"));
    };

    let timer = RequestTimer::new(state.metrics.clone());

    let mut request = Request::new(method, path.as_str(), state.buffer_pool.clone());
    for (key, value) in parse_query(&raw_query) {
        request.set_query_param(&key, &value);
    }
    let mut has_declared_body = false;
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            if name.as_str().eq_ignore_ascii_case("content-length") {
                has_declared_body = true;
            }
            request.set_header(name.as_str(), value);
        }
    }

    // a declared zero-length body is buffered empty; no declaration at
    // all leaves the content absent
    if !body.is_empty() || has_declared_body {
        if request.write_content(Some(&body)).is_err() {
            timer.fail();
            return Ok(plain_reply(
                413,
                b"{\"status\":413,\"message\":\"request body exceeds the buffer budget\"}",
            ));
        }
    }

    let mut response = Response::new(state.buffer_pool.clone());

    let pipeline = Pipeline::new(
        state.registry(),
        state.authenticator.clone(),
        state.acl.clone(),
        state.metrics.clone(),
    );
    pipeline.run(&mut request, &mut response).await;

    if response.status() == 403 {
        state.metrics.record_forbidden_request();
    }
    if response.is_in_error() {
        timer.fail();
    } else {
        timer.finish();
    }

    Ok(into_http(&response))
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn into_http(response: &Response) -> warp::http::Response<Vec<u8>> {
    let mut builder = warp::http::Response::builder().status(response.status());
    for (name, value) in response.headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(response.read_content().to_vec())
        .unwrap_or_else(|e| {
            warn!("failed to build response: {}", e);
            plain_reply(500, b"{\"status\":500,\"message\":\"internal error\"}")
        })
}

fn plain_reply(status: u16, body: &[u8]) -> warp::http::Response<Vec<u8>> {
    warp::http::Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(body.to_vec())
        .expect("static response")
}
