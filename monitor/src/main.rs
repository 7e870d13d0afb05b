use anyhow::{bail, Context, Result};
use cert_probe::TlsProber;
use clap::{Parser, Subcommand};
use discovery::KubeIngressSource;
use notifiers::{Dispatcher, DogStatsdNotifier, LogNotifier, Notifier, SlackNotifier, TeamsNotifier};
use std::path::PathBuf;
use std::sync::Arc;
use synthetics::{DatadogSynthetics, ReconcileSettings, Reconciler, SyntheticEndpoint};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::info;

mod config;
mod controller;
mod logging;

use config::Config;
use controller::Controller;

#[derive(Debug, Parser)]
#[command(name = "certmon", version, about = "TLS certificate expiry monitor for Kubernetes ingresses")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./certmon.yaml if present.
    /// Environment variables override file values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check certificates every interval until SIGINT or SIGTERM (default)
    Run,
    /// Run a single cycle and exit; non-zero if the cycle failed
    Once,
    /// Validate configuration and print it with secrets masked (JSON)
    CheckConfig,
    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);
    if let Commands::Version = command {
        println!("certmon {} (core {})", env!("CARGO_PKG_VERSION"), certmon_core::version());
        return Ok(());
    }

    let cfg = config::load_config(cli.config.as_deref()).context("invalid configuration")?;
    match command {
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&cfg.redacted())?);
        }
        Commands::Once => {
            logging::init(&cfg.log_level)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let controller = build_controller(&cfg).await?;
                let report = controller.run_once(OffsetDateTime::now_utc()).await?;
                info!(
                    bindings = report.bindings,
                    endpoints = report.endpoints,
                    unreachable = report.unreachable,
                    alerts = report.alerts,
                    notify_failures = report.notify_failures,
                    synthetics = ?report.synthetics,
                    "cycle finished"
                );
                anyhow::Ok(())
            })?;
        }
        Commands::Run => {
            logging::init(&cfg.log_level)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let controller = build_controller(&cfg).await?;
                let stop = stop_on_signal()?;
                controller.run(stop).await;
                anyhow::Ok(())
            })?;
        }
        Commands::Version => {}
    }
    Ok(())
}

async fn build_controller(cfg: &Config) -> Result<Controller> {
    let source = KubeIngressSource::connect(cfg.kube_config_path.as_deref(), cfg.cluster_name.clone())
        .await
        .context("connecting to the cluster API")?;
    let prober = TlsProber::new(cfg.dial_timeout)?;
    let mut controller = Controller::new(
        Box::new(source),
        Box::new(prober),
        build_dispatcher(cfg)?,
        cfg.interval,
        cfg.threshold,
    );
    if let Some(reconciler) = build_reconciler(cfg)? {
        controller = controller.with_reconciler(reconciler);
    }
    Ok(controller)
}

fn build_dispatcher(cfg: &Config) -> Result<Dispatcher> {
    let mut dispatcher = Dispatcher::default();
    for name in &cfg.notifiers {
        let notifier: Box<dyn Notifier> = match name.as_str() {
            "log" => Box::new(LogNotifier),
            "slack" => Box::new(SlackNotifier::new(&cfg.slack.token, &cfg.slack.channel, cfg.notifier_timeout)?),
            "teams" => Box::new(TeamsNotifier::new(&cfg.teams.webhook, cfg.notifier_timeout)?),
            "datadog" => Box::new(DogStatsdNotifier::new(
                &cfg.datadog.statsd_address,
                &cfg.datadog.gauge_key,
                cfg.datadog.statsd_tags.clone(),
            )?),
            other => bail!("unknown notifier {:?}", other),
        };
        dispatcher.register(notifier);
    }
    Ok(dispatcher)
}

fn build_reconciler(cfg: &Config) -> Result<Option<Reconciler>> {
    let syn = &cfg.synthetics;
    if !syn.enabled {
        return Ok(None);
    }
    let backend = DatadogSynthetics::new(
        &cfg.datadog.api_key,
        &cfg.datadog.application_key,
        &cfg.datadog.site,
        cfg.notifier_timeout,
    )?;
    let additional_endpoints = syn
        .additional_endpoints
        .iter()
        .map(|e| SyntheticEndpoint::parse(e).with_context(|| format!("additional endpoint {:?}", e)))
        .collect::<Result<Vec<_>>>()?;
    let settings = ReconcileSettings {
        ownership_tag: syn.default_tag.clone(),
        extra_tags: syn.tags.clone(),
        alert_message: syn.alert_message.clone(),
        check_interval: syn.check_interval,
        locations: syn.default_locations.clone(),
        additional_endpoints,
    };
    info!(tag = %settings.ownership_tag, additional = settings.additional_endpoints.len(), "synthetic checks enabled");
    Ok(Some(Reconciler::new(Arc::new(backend), settings)))
}

/// Install SIGINT/SIGTERM handlers; the returned receiver turns true on the
/// first signal.
fn stop_on_signal() -> Result<watch::Receiver<bool>> {
    let (tx, rx) = watch::channel(false);
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        let mut int = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
        tokio::spawn(async move {
            tokio::select! {
                _ = term.recv() => info!("received SIGTERM"),
                _ = int.recv() => info!("received SIGINT"),
            }
            let _ = tx.send(true);
        });
    }
    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C");
        }
        let _ = tx.send(true);
    });
    Ok(rx)
}
