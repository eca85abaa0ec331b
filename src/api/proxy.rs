//! Thin server-side endpoints: the search proxy that keeps the search API
//! key off the client, and two diagnostics.

use actix_web::{
    http::StatusCode, post, route, web, HttpRequest, HttpResponse, Result as WebResult,
};
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::app::AppState;

const KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "OPENROUTER_API_KEY", "EXA_API_KEY"];

/// Forwards the body verbatim and relays the upstream status and body.
#[post("/exa/search")]
pub async fn exa_search(
    state: web::Data<AppState>,
    client: web::Data<Client>,
    body: web::Json<Value>,
) -> WebResult<HttpResponse> {
    let search = &state.config.search;
    if search.api_key.is_empty() {
        warn!("Search proxy called without a configured API key");
        return Ok(HttpResponse::InternalServerError()
            .json(json!({ "error": "Search API key not configured" })));
    }

    let upstream = client
        .post(&search.upstream_url)
        .header("x-api-key", &search.api_key)
        .json(&body.into_inner())
        .send()
        .await;

    let resp = match upstream {
        Ok(resp) => resp,
        Err(e) => {
            error!("Search upstream unreachable: {}", e);
            return Ok(HttpResponse::BadGateway().json(json!({ "error": e.to_string() })));
        }
    };

    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let text = match resp.text().await {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to read search upstream body: {}", e);
            return Ok(HttpResponse::BadGateway().json(json!({ "error": e.to_string() })));
        }
    };
    info!("Search proxy relayed upstream status {}", status);

    Ok(HttpResponse::build(status)
        .content_type("application/json")
        .body(text))
}

fn key_presence() -> Value {
    let vars: serde_json::Map<String, Value> = KEY_VARS
        .iter()
        .map(|name| {
            let set = std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false);
            (name.to_string(), Value::Bool(set))
        })
        .collect();
    Value::Object(vars)
}

#[route("/debug", method = "GET", method = "POST")]
pub async fn debug(req: HttpRequest, state: web::Data<AppState>) -> WebResult<HttpResponse> {
    let llm = &state.config.llm;
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "method": req.method().as_str(),
        "timestamp": Utc::now().to_rfc3339(),
        "environment": key_presence(),
        "configured": {
            "gemini": llm.gemini.as_ref().is_some_and(|c| !c.api_key.is_empty()),
            "claude": llm.openai_compat.as_ref().is_some_and(|c| !c.api_key.is_empty()),
            "search": !state.config.search.api_key.is_empty(),
        },
    })))
}

#[route("/test", method = "GET", method = "POST")]
pub async fn api_test(req: HttpRequest) -> WebResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "message": "API is working",
        "method": req.method().as_str(),
        "timestamp": Utc::now().to_rfc3339(),
        "environment": key_presence(),
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(exa_search).service(debug).service(api_test);
}
