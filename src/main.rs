use std::time::Duration;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;

mod api;
mod cli;
mod config;
mod ctl;
mod error;
mod metrics;
mod models;
mod services;
mod state;

use cli::{Command, CommandArgs, GraceUpdateArgs, ServeArgs};
use config::ServerOptions;
use services::control;
use state::new_state;

const TRANSITION_INTERVAL: Duration = Duration::from_secs(1);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();
    match args.command {
        Command::Serve(serve) => run_server(serve).await,
        Command::GraceUpdate(update) => run_grace_update(update).await,
    }
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let bind_address = format!("{}:{}", args.address, args.port);

    let options = ServerOptions::load(&args.config)?;
    log::info!(
        "loaded {} group(s) from {}",
        options.process_group_configs.len(),
        args.config.display()
    );
    let state = new_state(options).context("Failed to set up process groups")?;

    print_banner(&args);

    actix_rt::spawn(control::run_transitions(state.clone(), TRANSITION_INTERVAL));

    let app_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(api::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await?;

    control::shutdown(&state).await?;
    Ok(())
}

async fn run_grace_update(args: GraceUpdateArgs) -> anyhow::Result<()> {
    let client = ctl::GraceClient::new(&args.server_url)?;
    let mut stdout = std::io::stdout();
    let wait = ctl::StopWait {
        timeout: Duration::from_secs(args.stop_timeout),
        ..ctl::StopWait::default()
    };
    ctl::grace_update(&client, &args.group, args.start, wait, &mut stdout).await
}

fn print_banner(args: &ServeArgs) {
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      supervisor-grace v{:<35}║", env!("CARGO_PKG_VERSION"));
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("🚀 Server starting on http://{}:{}", args.address, args.port);
    println!("📄 Config: {}", args.config.display());
    println!();
    println!("📋 Available endpoints:");
    println!("  GET    /grace/getAPIVersion                 - API version");
    println!("  GET    /grace/getGroupNames                 - List groups");
    println!("  POST   /grace/log                           - Write to the host log");
    println!("  POST   /grace/addProgramToGroup             - Add a program to a group");
    println!("  POST   /grace/UpdateNumprocs                - Apply a numprocs change");
    println!("  POST   /grace/removeProcessFromGroup        - Remove a stopped process");
    println!("  POST   /supervisor/startProcess             - Start a process");
    println!("  POST   /supervisor/stopProcess              - Stop a process");
    println!("  GET    /supervisor/getProcessInfo/{{name}}    - Process info");
    println!("  GET    /supervisor/getAllProcessInfo        - All process info");
    println!("  GET    /metrics                             - Prometheus metrics");
    println!("  GET    /health                              - Health check");
    println!("═══════════════════════════════════════════════════════════");
}
