//! Command-line front end for 9800 NETCONF operations.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use wlc_netconf::aptag::{self, ApTag};
use wlc_netconf::config;
use wlc_netconf::schema;
use wlc_netconf::session::{
    ConnectParams, ConnectionSecurityOptions, Datastore, MANAGER, NetconfSession,
    SecurityLevel, SessionRecordLevel, SessionRecorder,
};
use wlc_netconf::templates;

#[derive(Parser)]
#[command(name = "wlc-netconf")]
#[command(version)]
#[command(about = "NETCONF operations for Cisco 9800 wireless controllers", long_about = None)]
struct Cli {
    /// Controller address
    #[arg(long, env = "WLC_HOST")]
    host: String,

    /// NETCONF port
    #[arg(long, env = "WLC_PORT", default_value_t = config::DEFAULT_NETCONF_PORT)]
    port: u16,

    /// NETCONF user
    #[arg(short, long, env = "WLC_USERNAME", default_value = "netconf")]
    username: String,

    /// NETCONF password
    #[arg(short, long, env = "WLC_PASSWORD", hide_env_values = true)]
    password: String,

    /// SSH algorithm profile
    #[arg(long, value_enum, default_value_t = SecurityArg::Balanced)]
    security: SecurityArg,

    /// Verify the controller host key against known_hosts
    #[arg(long)]
    verify_host_key: bool,

    /// RPC timeout in seconds
    #[arg(long, default_value_t = config::DEFAULT_RPC_TIMEOUT.as_secs())]
    timeout: u64,

    /// Write a JSONL transcript of the session to this file
    #[arg(long, value_name = "FILE")]
    record: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SecurityArg {
    Secure,
    Balanced,
    Legacy,
}

impl From<SecurityArg> for SecurityLevel {
    fn from(arg: SecurityArg) -> Self {
        match arg {
            SecurityArg::Secure => SecurityLevel::Secure,
            SecurityArg::Balanced => SecurityLevel::Balanced,
            SecurityArg::Legacy => SecurityLevel::LegacyCompatible,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the capabilities advertised by the controller
    Capabilities,

    /// Download the YANG schema of every advertised module
    Schemas {
        /// Output directory
        #[arg(long, default_value = schema::DEFAULT_SCHEMA_DIR)]
        dir: PathBuf,
    },

    /// Print the full running configuration
    RunningConfig,

    /// Print AP tag assignments and write them to a timestamped CSV file
    ExportTags {
        /// Output directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Only print the assignments, do not write a CSV file
        #[arg(long)]
        no_file: bool,
    },

    /// Apply AP tag assignments from a CSV file
    ImportTags {
        /// CSV file with rows: ap-mac, policy-tag, site-tag, rf-tag
        #[arg(long, default_value = aptag::DEFAULT_IMPORT_FILE)]
        file: PathBuf,
    },

    /// Assign tags to a single AP
    SetTag {
        /// AP Ethernet MAC
        #[arg(long)]
        mac: String,
        #[arg(long)]
        policy_tag: Option<String>,
        #[arg(long)]
        site_tag: Option<String>,
        #[arg(long)]
        rf_tag: Option<String>,
    },

    /// Copy running-config to startup-config
    SaveConfig,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let start = Instant::now();
    println!("** Starting wlc-netconf...\n");

    let params = ConnectParams {
        user: cli.username.clone(),
        addr: cli.host.clone(),
        port: cli.port,
        password: cli.password.clone(),
        rpc_timeout: Duration::from_secs(cli.timeout),
    };
    let security = ConnectionSecurityOptions::for_level(cli.security.into(), cli.verify_host_key);

    let (session, recorder) = if cli.record.is_some() {
        let (session, recorder) = MANAGER
            .get_with_recording_level(&params, security, SessionRecordLevel::KeyEventsOnly)
            .await
            .with_context(|| format!("connecting to {}", params.device_addr()))?;
        (session, Some(recorder))
    } else {
        let session = MANAGER
            .get_with_security(&params, security)
            .await
            .with_context(|| format!("connecting to {}", params.device_addr()))?;
        (session, None)
    };

    let outcome = {
        let mut guard = session.lock().await;
        run(&mut guard, cli.command).await
    };

    let closed = MANAGER
        .close(&params)
        .await
        .context("closing NETCONF session");

    if let (Some(path), Some(recorder)) = (cli.record.as_ref(), recorder.as_ref()) {
        write_recording(path, recorder)?;
    }

    outcome?;
    closed?;

    println!(
        "** Time to run: {:.2} sec",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn run(session: &mut NetconfSession, command: Commands) -> Result<()> {
    match command {
        Commands::Capabilities => {
            println!("Printing server capabilities:");
            for capability in session.server_capabilities() {
                println!("\t{capability}");
            }
            println!();
        }
        Commands::Schemas { dir } => {
            println!("Importing YANG schemas from NETCONF server...");
            let modules = schema::export_schemas(session, &dir)
                .await
                .context("downloading YANG schemas")?;
            for module in &modules {
                println!("\t{module}");
            }
            println!(
                "Imported {} YANG schema(s) into {}\n",
                modules.len(),
                dir.display()
            );
        }
        Commands::RunningConfig => {
            println!("Importing NETCONF full configuration. This may take a while...");
            let reply = session
                .get_config(Datastore::Running)
                .await
                .context("get-config running")?;
            println!(
                "NETCONF full configuration using get-config:\n{}",
                templates::pretty_xml(&reply.raw)?
            );
        }
        Commands::ExportTags { dir, no_file } => {
            let (reply, tags) = aptag::fetch_ap_tags_with_reply(session)
                .await
                .context("reading AP tag configuration")?;
            println!(
                "NETCONF AP tag configuration:\n{}",
                templates::pretty_xml(&reply.raw)?
            );
            if no_file {
                println!("AP tag configuration:");
            } else {
                let path = aptag::export_csv(&tags, &dir).context("writing AP tag CSV")?;
                println!(
                    "Writing AP tag configuration to CSV file named {}:",
                    path.display()
                );
            }
            for tag in &tags {
                println!("\t{tag}");
            }
            println!();
        }
        Commands::ImportTags { file } => {
            println!("Importing {} file", file.display());
            let tags = aptag::import_csv(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            for tag in &tags {
                let [mac, policy, site, rf] = tag.columns();
                println!("\t{mac}, {policy}, {site}, {rf}");
            }
            println!("Processed {} lines.\n", tags.len());
            apply_and_print(session, &tags).await?;
        }
        Commands::SetTag {
            mac,
            policy_tag,
            site_tag,
            rf_tag,
        } => {
            let tag = ApTag::from_columns(
                &mac,
                policy_tag.as_deref().unwrap_or(""),
                site_tag.as_deref().unwrap_or(""),
                rf_tag.as_deref().unwrap_or(""),
            )?;
            apply_and_print(session, &[tag]).await?;
        }
        Commands::SaveConfig => {
            let reply = session
                .dispatch(&templates::save_config())
                .await
                .context("save-config")?;
            println!(
                "NETCONF save config response:\n{}",
                templates::pretty_xml(&reply.raw)?
            );
        }
    }
    Ok(())
}

async fn apply_and_print(session: &mut NetconfSession, tags: &[ApTag]) -> Result<()> {
    println!(
        "NETCONF template for editing the AP tag configuration:\n{}",
        templates::ap_tags_config(tags)
    );
    let reply = aptag::apply_ap_tags(session, tags)
        .await
        .context("edit-config AP tags")?;
    println!(
        "NETCONF response for editing the AP tag configuration:\n{}",
        templates::pretty_xml(&reply.raw)?
    );
    Ok(())
}

fn write_recording(path: &Path, recorder: &SessionRecorder) -> Result<()> {
    let jsonl = recorder.to_jsonl()?;
    std::fs::write(path, jsonl)
        .with_context(|| format!("writing session recording {}", path.display()))?;
    println!("Session recording written to {}", path.display());
    Ok(())
}
