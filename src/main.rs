// Copyright 2026 The Tollgate Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use tollgate::auth::{EnvTokenProvider, TokenProvider};
use tollgate::config::Config;
use tollgate::conversation::{ConversationStore, InMemoryConversationStore};
use tollgate::server::{build_router, AppState};
use tollgate::turn::{TurnDeps, TurnRunner};
use tollgate::upstream::{ReqwestConnector, UpstreamConnector};

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "tollgate", about = "Streaming chat relay with OAuth consent pause/resume")]
struct Cli {
    /// Base URL of the upstream project endpoint
    #[arg(long, env = "PROJECT_ENDPOINT")]
    project_endpoint: String,

    /// Agent identifier sent as the model of every upstream request
    #[arg(long, env = "AGENT_ID")]
    agent_id: String,

    /// Comma-separated browser origins allowed by CORS
    #[arg(long, env = "CORS_ORIGINS", default_value = "http://localhost:3000")]
    cors_origins: String,

    /// Environment variable read for the upstream bearer token
    #[arg(long, env = "TOKEN_ENV", default_value = "UPSTREAM_ACCESS_TOKEN")]
    token_env: String,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 8000, env = "PORT")]
    port: u16,

    /// Overall timeout for one upstream streaming call, in seconds
    #[arg(long, default_value_t = 120, env = "UPSTREAM_TIMEOUT_SECS")]
    upstream_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::new(
        &cli.project_endpoint,
        &cli.agent_id,
        &cli.cors_origins,
        Duration::from_secs(cli.upstream_timeout_secs),
    ) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let connector: Arc<dyn UpstreamConnector> =
        match ReqwestConnector::with_timeout(config.upstream_timeout) {
            Ok(connector) => Arc::new(connector),
            Err(e) => {
                tracing::error!("failed to build upstream client: {e}");
                std::process::exit(1);
            }
        };

    let tokens: Arc<dyn TokenProvider> = Arc::new(EnvTokenProvider::new(cli.token_env));
    let conversations: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());

    let runner = Arc::new(TurnRunner::new(TurnDeps {
        config: config.clone(),
        tokens,
        connector,
        conversations: conversations.clone(),
    }));

    let app = build_router(
        AppState {
            runner,
            conversations,
        },
        &config.allowed_origins,
    );

    let addr = SocketAddr::from((cli.host, cli.port));
    tracing::info!(
        %addr,
        endpoint = %config.project_endpoint,
        agent = %config.agent_id,
        "tollgate starting"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "tollgate listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
