use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use elb_manager::{
    HttpLoadBalancerService, LoadBalancerDescription, LoadBalancerManager, ManagerConfig,
    ManagerError, Presence, ServiceConfig,
};
use serde_json::json;
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "elbctl")]
#[command(about = "Manage the classic load balancer in front of a control-plane API", long_about = None)]
struct Args {
    /// Provider control endpoint
    #[arg(long, env = "ELB_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a load balancer with a TCP listener and the default health check
    Provision {
        name: String,

        /// Subnets to attach, in order (repeat or comma-separate)
        #[arg(long = "subnet", required = true, value_delimiter = ',')]
        subnets: Vec<String>,

        /// Frontend and backend port
        #[arg(long, default_value_t = elb_manager::CONTROL_PLANE_PORT)]
        port: u16,
    },

    /// Remove the control-plane listener
    SetPrivate { name: String },

    /// Add the control-plane listener back
    SetPublic {
        name: String,

        #[arg(long, default_value_t = elb_manager::CONTROL_PLANE_PORT)]
        port: u16,
    },

    /// Register instances with the load balancer
    AddInstances {
        name: String,
        instance_ids: Vec<String>,
    },

    /// Deregister instances from the load balancer
    RemoveInstances {
        name: String,
        instance_ids: Vec<String>,
    },

    /// Check whether a load balancer exists
    Exists { name: String },

    /// Show listeners, members and health check
    Describe { name: String },

    /// Re-apply the configured health check
    HealthCheck { name: String },
}

fn init_tracing(log_json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "elbctl=info,elb_manager=info".into());

    let text_layer = (!log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let json_layer =
        log_json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .init();
}

fn build_manager(endpoint: Option<String>) -> Result<LoadBalancerManager> {
    let service_config = ServiceConfig::from_lookup(|key| match key {
        "ELB_ENDPOINT" => endpoint.clone(),
        other => env::var(other).ok(),
    })
    .context("Failed to load provider configuration")?;
    let manager_config =
        ManagerConfig::from_env().context("Failed to load manager configuration")?;

    let service = Arc::new(HttpLoadBalancerService::new(&service_config));
    Ok(LoadBalancerManager::with_config(service, manager_config))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_json);

    let manager = build_manager(args.endpoint)?;
    let json_output = args.json;

    let result = run(&manager, args.command, json_output).await;
    if let Err(e) = &result {
        if let Some(manager_error) = e.downcast_ref::<ManagerError>() {
            if json_output {
                println!(
                    "{}",
                    json!({
                        "error": manager_error.to_string(),
                        "retryable": manager_error.is_retryable(),
                    })
                );
            } else if manager_error.is_retryable() {
                eprintln!("{}", "The operation can be retried.".yellow());
            }
        }
    }
    result
}

async fn run(manager: &LoadBalancerManager, command: Commands, json_output: bool) -> Result<()> {
    match command {
        Commands::Provision {
            name,
            subnets,
            port,
        } => {
            let dns_name = manager.provision(&name, &subnets, port).await?;
            if json_output {
                println!("{}", json!({ "name": name, "dns_name": dns_name }));
            } else {
                println!("{} {} -> {}", "Provisioned".green(), name.bold(), dns_name);
            }
        }
        Commands::SetPrivate { name } => {
            manager.set_private(&name).await?;
            report(json_output, &name, "private");
        }
        Commands::SetPublic { name, port } => {
            manager.set_public(&name, port).await?;
            report(json_output, &name, "public");
        }
        Commands::AddInstances { name, instance_ids } => {
            let count = instance_ids.len();
            manager.add_instances(&name, instance_ids).await?;
            info!(load_balancer = %name, requested = count, "Registration accepted");
            report(json_output, &name, "instances registered");
        }
        Commands::RemoveInstances { name, instance_ids } => {
            manager.remove_instances(&name, instance_ids).await?;
            report(json_output, &name, "instances deregistered");
        }
        Commands::Exists { name } => {
            let presence = manager.exists(&name).await?;
            if json_output {
                println!(
                    "{}",
                    json!({
                        "name": name,
                        "found": presence.is_found(),
                        "dns_name": presence.dns_name(),
                    })
                );
            } else {
                match presence {
                    Presence::Found { dns_name } => {
                        println!("{} {} -> {}", "Found".green(), name.bold(), dns_name)
                    }
                    Presence::Absent => println!("{} {}", "Absent".yellow(), name.bold()),
                }
            }
        }
        Commands::Describe { name } => match manager.describe(&name).await? {
            Some(description) => {
                if json_output {
                    println!("{}", serde_json::to_string_pretty(&description)?);
                } else {
                    print_description(&description, manager.config().control_plane_port);
                }
            }
            None => {
                return Err(ManagerError::NotFound { name }.into());
            }
        },
        Commands::HealthCheck { name } => {
            manager.restore_health_check(&name).await?;
            report(json_output, &name, "health check configured");
        }
    }

    Ok(())
}

fn report(json_output: bool, name: &str, outcome: &str) {
    if json_output {
        println!("{}", json!({ "name": name, "status": outcome }));
    } else {
        println!("{} {}: {}", "OK".green(), name.bold(), outcome);
    }
}

fn print_description(description: &LoadBalancerDescription, control_plane_port: u16) {
    println!("{}", description.name.as_str().bold());
    println!("  dns name:    {}", description.dns_name);
    println!("  created:     {}", description.created_at.to_rfc3339());
    println!("  subnets:     {}", description.subnets.join(", "));
    println!(
        "  visibility:  {}",
        description.visibility(control_plane_port).to_string().cyan()
    );

    println!("  listeners:");
    if description.listeners.is_empty() {
        println!("    {}", "(none)".dimmed());
    }
    for listener in &description.listeners {
        println!("    {}", listener);
    }

    match &description.health_check {
        Some(health_check) => println!(
            "  health:      {} every {}s, timeout {}s, {}/{} thresholds",
            health_check.target(),
            health_check.interval_secs,
            health_check.timeout_secs,
            health_check.healthy_threshold,
            health_check.unhealthy_threshold
        ),
        None => println!("  health:      {}", "not configured".red()),
    }

    println!("  instances ({}):", description.instances.len());
    for instance in &description.instances {
        println!("    {}", instance);
    }
}
