//! The operator HTTP console: a tiny `actix-web` + `tera` dashboard that
//! renders this node's predecessor, successor list and finger table, and
//! lets an operator issue ad hoc get/put calls from a browser. Routing
//! for get/put goes through `client::resolve_owner` exactly as the CLI
//! does — the console carries no ring logic of its own.

use std::sync::Arc;

use actix_web::web::{Data, Query};
use actix_web::{get, App, HttpResponse, HttpServer, Responder};
use log::info;
use serde::Deserialize;
use tera::{Context, Tera};

use crate::client;
use crate::node::NodeState;

#[derive(Deserialize)]
struct QueryParams {
    get_key: Option<String>,
    put_key: Option<String>,
    put_value: Option<String>,
}

#[get("/")]
async fn index(state: Data<Arc<NodeState>>, query: Query<QueryParams>) -> impl Responder {
    let tera = match Tera::new("static/html/**/*") {
        Ok(tera) => tera,
        Err(e) => return HttpResponse::InternalServerError().body(format!("template error: {e}")),
    };
    let mut context = Context::new();
    context.insert("title", "Chord Node");
    context.insert("node_id", &state.id().to_string());
    context.insert("address", &state.self_ref.address);
    context.insert("ready", &state.is_ready());

    let predecessor = state.predecessor_snapshot().map(|p| p.address);
    context.insert("predecessor", &predecessor);

    let successors: Vec<String> = state.successor_list_snapshot().iter().map(|f| f.address.clone()).collect();
    context.insert("successors", &successors);

    let fingers: Vec<String> = state.fingers.lock().unwrap().fingers.iter().map(|f| f.address.clone()).collect();
    context.insert("fingers", &fingers);

    let local_address = state.self_ref.address.clone();
    let rpc_timeout = state.config.rpc_timeout;

    if let Some(key) = &query.get_key {
        match client::get(&local_address, key, rpc_timeout).await {
            Ok(client::GetOutcome::Found(value)) => {
                context.insert("get_status", "OK");
                context.insert("get_value", &value);
            }
            Ok(client::GetOutcome::NotFound) => context.insert("get_status", "NOT_FOUND"),
            Ok(client::GetOutcome::Expired) => context.insert("get_status", "EXPIRED"),
            Err(e) => context.insert("get_status", &format!("ERROR: {e}")),
        }
        context.insert("get_key", key);
    }

    if let (Some(key), Some(value)) = (&query.put_key, &query.put_value) {
        match client::put(&local_address, key, value.clone(), 0, rpc_timeout).await {
            Ok(()) => context.insert("put_status", "OK"),
            Err(e) => context.insert("put_status", &format!("ERROR: {e}")),
        }
        context.insert("put_key", key);
    }

    match tera.render("index.html", &context) {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(e) => HttpResponse::InternalServerError().body(format!("render error: {e}")),
    }
}

/// Runs the console until the process exits. Bound separately from the
/// gRPC server so a slow browser client can never stall overlay traffic.
pub async fn run(state: Arc<NodeState>, bind_address: String) -> std::io::Result<()> {
    info!("operator console listening on {bind_address}");
    HttpServer::new(move || App::new().app_data(Data::new(state.clone())).service(index))
        .bind(&bind_address)?
        .run()
        .await
}
