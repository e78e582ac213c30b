/*
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

//! Process entry point: parse the CLI, load this node's profile out of
//! the cluster's RON config, wire `ember-actor`/`ember-net`/`ember-cluster`
//! together, and drive the accept loops to completion. Mirrors the
//! teacher's "install tracing first, then build and run the application"
//! boot shape (`ActorSystem::with_env_tracing` / `run_actor_system!`).

mod cli;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use ember_actor::path::ActorPath;
use ember_actor::system::ActorSystem;
use ember_cluster::client::ClusterClient;
use ember_cluster::remote::ClusterForwarder;
use ember_cluster::server::ClusterServer;
use ember_net::connector::Connector;
use ember_net::handler::HandlerComponent;
use ember_net::session::Session;
use ember_proto::dict::RouteDict;
use tokio::net::TcpListener;
use tracing::info;

use crate::cli::Cli;
use crate::config::ClusterConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cluster_config = ClusterConfig::load(&cli.config)?;
    let profile = cluster_config.node(&cli.node_id)?.clone();
    info!(node_id = %profile.node_id, node_type = %profile.node_type, "booting ember node");

    let actor_system = ActorSystem::new(profile.node_id.clone());
    let hsys = actor_system.handle();

    let handler = HandlerComponent::new(profile.node_type.clone(), hsys.clone());
    register_default_resolver(&handler, profile.node_id.clone());

    let mut connector = Connector::new(profile.connector_config(), handler, RouteDict::new())?;

    let cluster_client = Arc::new(ClusterClient::new(profile.node_id.clone(), cluster_config.directory()));
    let forwarder = ClusterForwarder::new(cluster_client.clone(), connector.sessions().clone());
    connector.set_remote_forwarder(Arc::new(forwarder));
    let connector = Arc::new(connector);
    connector.spawn_heartbeat_supervisor();

    let cluster_server = Arc::new(ClusterServer::new(hsys.clone()));
    let rpc_listener = TcpListener::bind(profile.address.as_str()).await?;
    info!(address = %profile.address, "cluster rpc listening");
    tokio::spawn(cluster_server.accept_tcp(rpc_listener));

    if let Some(addr) = &profile.listen_tcp {
        let listener = TcpListener::bind(addr.as_str()).await?;
        info!(%addr, "tcp connector listening");
        tokio::spawn(connector.clone().accept_tcp(listener));
    }

    if let Some(addr) = &profile.listen_ws {
        let router = ember_net::ws::router(connector.clone());
        let socket_addr: SocketAddr = addr.parse()?;
        let listener = TcpListener::bind(socket_addr).await?;
        info!(%addr, "websocket connector listening");
        tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                tracing::error!(error = %e, "websocket listener exited");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    Ok(())
}

/// Routes of the form `nodeType.actor.method` resolve to an actor whose
/// type is the route's method-agnostic handler segment and whose id is
/// the session's bound uid, falling back to the raw session id before a
/// client has authenticated. A concrete deployment that needs other
/// handler names registers its own resolvers on `handler` before this
/// point; this is the one sensible default the framework ships with.
fn register_default_resolver(handler: &HandlerComponent, own_node_id: String) {
    handler.register("actor", move |session: &Session, _method: &str| {
        let uid = session.uid();
        let actor_id = if uid != 0 { uid.to_string() } else { session.id.to_string() };
        ActorPath::new(own_node_id.clone(), "actor", actor_id)
    });
}
