// SPDX-License-Identifier: AGPL-3.0-or-later
//! run-vault: configure and start a Vault server under systemd

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use run_vault::launcher::Systemctl;
use run_vault::lookup::{Ec2MetadataClient, UnixFileOwners};
use run_vault::version::BinaryVersionProbe;
use run_vault::{Capabilities, Defaults, Pipeline, RawOptions, RunReport, RunVaultError};

/// Configures and runs Vault
///
/// Writes a Vault config file and a systemd unit for Vault, then uses
/// systemd to (re)start Vault. Meant to run on an EC2 instance as part of
/// its user data.
#[derive(Parser, Debug)]
#[command(name = "run-vault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TLS certificate file Vault serves with
    #[arg(long, value_name = "PATH")]
    tls_cert_file: Option<String>,

    /// Path to the TLS private key file Vault serves with
    #[arg(long, value_name = "PATH")]
    tls_key_file: Option<String>,

    /// Port Vault listens on [default: 8200]
    #[arg(long)]
    port: Option<u16>,

    /// Port Vault listens on for server-to-server traffic [default: --port + 1]
    #[arg(long)]
    cluster_port: Option<u16>,

    /// Full address advertised to clients [default: https://<instance ip>:<port>]
    #[arg(long)]
    api_addr: Option<String>,

    /// Vault config directory [default: ../config relative to this binary]
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Directory holding the Vault binary [default: ../bin relative to this binary]
    #[arg(long, value_name = "DIR")]
    bin_dir: Option<PathBuf>,

    /// Vault log level [default: info]
    #[arg(long)]
    log_level: Option<String>,

    /// systemd StandardOutput target [default: systemd's own]
    #[arg(long)]
    systemd_stdout: Option<String>,

    /// systemd StandardError target [default: systemd's own]
    #[arg(long)]
    systemd_stderr: Option<String>,

    /// User to run Vault as [default: owner of --config-dir]
    #[arg(long)]
    user: Option<String>,

    /// Do not generate a Vault config file
    #[arg(long)]
    skip_vault_config: bool,

    /// Store data in S3 and use Consul for HA coordination only
    #[arg(long)]
    enable_s3_backend: bool,

    /// S3 bucket for Vault data (required with --enable-s3-backend)
    #[arg(long)]
    s3_bucket: Option<String>,

    /// Region of the S3 bucket (required with --enable-s3-backend)
    #[arg(long)]
    s3_bucket_region: Option<String>,

    /// Unseal automatically through AWS KMS
    #[arg(long)]
    enable_auto_unseal: bool,

    /// KMS key id or alias (required with --enable-auto-unseal)
    #[arg(long)]
    auto_unseal_kms_key_id: Option<String>,

    /// Region of the KMS key (required with --enable-auto-unseal)
    #[arg(long)]
    auto_unseal_kms_key_region: Option<String>,

    /// Custom KMS endpoint, e.g. a VPC endpoint
    #[arg(long)]
    auto_unseal_endpoint: Option<String>,

    /// Print the rendered files instead of writing them and restarting Vault
    #[arg(long)]
    dry_run: bool,

    /// TOML file overriding built-in defaults
    #[arg(long, value_name = "PATH")]
    defaults: Option<PathBuf>,
}

impl Cli {
    fn raw_options(&self) -> RawOptions {
        RawOptions {
            tls_cert_file: self.tls_cert_file.clone(),
            tls_key_file: self.tls_key_file.clone(),
            port: self.port,
            cluster_port: self.cluster_port,
            api_addr: self.api_addr.clone(),
            config_dir: self.config_dir.clone(),
            bin_dir: self.bin_dir.clone(),
            log_level: self.log_level.clone(),
            systemd_stdout: self.systemd_stdout.clone(),
            systemd_stderr: self.systemd_stderr.clone(),
            user: self.user.clone(),
            skip_vault_config: self.skip_vault_config,
            enable_s3_backend: self.enable_s3_backend,
            s3_bucket: self.s3_bucket.clone(),
            s3_bucket_region: self.s3_bucket_region.clone(),
            enable_auto_unseal: self.enable_auto_unseal,
            auto_unseal_kms_key_id: self.auto_unseal_kms_key_id.clone(),
            auto_unseal_kms_key_region: self.auto_unseal_kms_key_region.clone(),
            auto_unseal_endpoint: self.auto_unseal_endpoint.clone(),
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return parse_failure(e),
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            if e
                .downcast_ref::<RunVaultError>()
                .is_some_and(RunVaultError::wants_usage)
            {
                eprintln!("{}", Cli::command().render_usage());
            }
            ExitCode::FAILURE
        }
    }
}

/// `--help` and `--version` exit 0; anything else clap rejects exits 1
fn parse_failure(e: clap::Error) -> ExitCode {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = e.print();
            ExitCode::SUCCESS
        }
        kind => {
            let _ = e.print();
            if kind == ErrorKind::UnknownArgument {
                let option = e
                    .get(clap::error::ContextKind::InvalidArg)
                    .map(|value| value.to_string())
                    .unwrap_or_default();
                error!("{}", RunVaultError::UnrecognizedOption { option });
            } else {
                error!(kind = ?kind, "Invalid command line");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let defaults = match &cli.defaults {
        Some(path) => Defaults::from_file(path)
            .with_context(|| format!("Failed to load defaults from {}", path.display()))?,
        None => Defaults::default(),
    };

    let metadata = Ec2MetadataClient::new(
        defaults.metadata_endpoint.clone(),
        Duration::from_secs(defaults.metadata_timeout_secs),
    );
    let owners = UnixFileOwners;
    let probe = BinaryVersionProbe;
    let supervisor = Systemctl::default();

    let caps = Capabilities {
        metadata: &metadata,
        owners: &owners,
        probe: &probe,
        supervisor: &supervisor,
    };

    info!("Starting Vault install");
    let report = Pipeline::new(&defaults, caps, cli.dry_run).run(&cli.raw_options())?;

    if report.dry_run {
        println!("# effective defaults");
        println!("{}", defaults.to_toml()?);
        print_report(&report);
    } else {
        info!("Vault install complete!");
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    if let Some(config) = &report.config {
        println!("# {}", report.config_path.display());
        println!("{}", config);
    }
    println!("# {}", report.unit_path.display());
    print!("{}", report.unit);
}
