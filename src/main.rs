//! Net Monitor - Main CLI Application
//!
//! Runs the ping, download and upload scans until interrupted.

use clap::Parser;
use net_monitor::{
    cli::Cli,
    config::{load_config, EnvManager},
    error::{AppError, Result},
    App, RunReport,
};
use std::{error::Error, process};

#[tokio::main]
async fn main() {
    // Set up better panic handling
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    // usage errors share exit code 1 with configuration errors
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };

    if cli.print_env_example {
        print!("{}", EnvManager::create_example_env_content());
        return;
    }

    let use_color = !cli.no_color && std::env::var_os("NO_COLOR").is_none();

    match run_application(cli).await {
        Ok(report) => {
            let records: u64 = report.metrics.iter().map(|m| m.records).sum();
            eprintln!("Stopped after {} records (session {})", records, report.session_id);
        }
        Err(e) => {
            eprintln!("Error: {}", e.format_for_console(use_color));

            if let Some(source) = e.source() {
                eprintln!("Caused by: {}", source);
            }

            print_error_suggestions(&e);

            process::exit(e.exit_code());
        }
    }
}

/// Main application logic
async fn run_application(cli: Cli) -> Result<RunReport> {
    let config = load_config(cli)?;
    let app = App::new(config).await?;
    app.run().await
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) | AppError::Validation(_) | AppError::Parse(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Check your .env file format (see --print-env-example)");
            eprintln!("  - Intervals are whole seconds greater than 0");
            eprintln!("  - At least one of ping, download and upload must stay enabled");
        }
        AppError::Discovery(_) | AppError::Network(_) | AppError::HttpRequest(_) => {
            eprintln!();
            eprintln!("Speed test server troubleshooting:");
            eprintln!("  - Check your internet connection");
            eprintln!("  - Verify the server list URL (--servers-url)");
            eprintln!("  - Raise --http-timeout on slow links");
        }
        AppError::DnsResolution(_) => {
            eprintln!();
            eprintln!("DNS resolution help:");
            eprintln!("  - Check the spelling of --additional-ping-hosts");
            eprintln!("  - Test resolution manually with 'nslookup' or 'dig'");
        }
        AppError::Ping(_) => {
            eprintln!();
            eprintln!("ICMP help:");
            eprintln!("  - Raw sockets need root or CAP_NET_RAW");
            eprintln!("  - On Linux, net.ipv4.ping_group_range allows unprivileged ICMP");
        }
        _ => {}
    }
}
