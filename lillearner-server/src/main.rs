use lillearner_server::{server, storage};
mod cli;

use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    use clap::Parser;
    let args = cli::Cli::parse();

    // Console-only logging with env-driven level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(true)
        .init();

    let config_path = args.config_path();
    let config = match server::AppConfig::load_from_path(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, path = %config_path.display(), "Failed to load config");
            std::process::exit(2);
        }
    };

    match args.command {
        Some(cli::Command::CheckConfig) => {
            check_config(&config);
            return;
        }
        Some(cli::Command::RebuildLevels) => {
            let store = connect_store(&args.db_path()).await;
            match store.rebuild_levels().await {
                Ok(repaired) => println!("rebuilt levels; {} row(s) repaired", repaired),
                Err(e) => {
                    tracing::error!(error = %e, "rebuild-levels failed");
                    std::process::exit(3);
                }
            }
            return;
        }
        None => {}
    }

    let store = connect_store(&args.db_path()).await;
    let port = args.port(config.port());

    let state = match server::AppState::new(config, store) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Invalid config");
            std::process::exit(2);
        }
    };
    let shutdown_token = state.shutdown_token();
    let shutdown_token_for_server = shutdown_token.clone();

    let app = server::router(state);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    tracing::info!(%addr, "Starting server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind listener");
            std::process::exit(4);
        }
    };

    // Graceful shutdown on SIGINT/SIGTERM with a fallback timeout
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_token_for_server.cancelled_owned())
            .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown: initiating graceful stop");
    shutdown_token.cancel();
    match tokio::time::timeout(std::time::Duration::from_secs(3), &mut server_task).await {
        Ok(join_res) => match join_res {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(%err, "server error"),
            Err(e) => tracing::error!(error=%e, "server task join error"),
        },
        Err(_) => {
            tracing::warn!("shutdown: forcing server abort due to timeout");
            server_task.abort();
        }
    }
}

async fn connect_store(db_path: &Path) -> storage::Store {
    // Ensure data dir exists when using default
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        let _ = std::fs::create_dir_all(parent);
    }
    let path = db_path.to_string_lossy();
    match storage::Store::connect_sqlite(&path).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, path = %path, "Failed to connect DB");
            std::process::exit(3);
        }
    }
}

fn check_config(config: &server::AppConfig) {
    let tz = match config.tz() {
        Ok(tz) => tz,
        Err(e) => {
            eprintln!("config error: {}", e);
            std::process::exit(2);
        }
    };
    let catalog = match config.resolve_catalog() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("catalog error: {}", e);
            std::process::exit(2);
        }
    };
    let skills: usize = catalog.categories.iter().map(|c| c.skills.len()).sum();
    println!("listen_port:   {}", config.port());
    println!("timezone:      {}", tz);
    println!("gamification:  {}", config.gamification);
    println!("bonus xp:      {}", config.achievement_bonus_xp);
    println!(
        "catalog:       {} ({} categories, {} skills, {} achievements)",
        if config.catalog.is_some() { "inline" } else { "builtin" },
        catalog.categories.len(),
        skills,
        catalog.achievements.len()
    );
    match &config.llm {
        Some(llm) => {
            let key = std::env::var(&llm.api_key_env).is_ok_and(|k| !k.trim().is_empty());
            println!(
                "llm:           {} @ {} (key {} {})",
                llm.model,
                llm.base_url,
                llm.api_key_env,
                if key { "set" } else { "MISSING" }
            );
        }
        None => println!("llm:           disabled"),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(i), Ok(t)) => (i, t),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "failed to install signal handlers");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("shutdown: received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("shutdown: received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown: received Ctrl+C");
    }
}
