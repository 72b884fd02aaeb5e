use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use kprune_api::{KubeLive, ReconcileOptions, ReconcileReport, Reconciler};
use kprune_core::{KindSelector, ProtectionTable};
use kprune_kubehub::resolve_namespace;
use kprune_ops::RetentionPolicy;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "kprunectl", version, about = "Prune Kubernetes resources that are no longer declared in manifests")]
struct Cli {
    /// Path to a kubeconfig file (default: KUBECONFIG, then ~/.kube/config)
    #[arg(long = "kubeconfig")]
    kubeconfig: Option<PathBuf>,

    /// Kube context to use (default: current context)
    #[arg(long = "context")]
    context: Option<String>,

    /// Namespace to prune (default: the context's namespace)
    #[arg(short = 'n', long = "namespace", env = "KPRUNE_NAMESPACE")]
    namespace: Option<String>,

    /// Service, StatefulSet, Deployment, CronJob, LimitRange, DaemonSet, Jobs or All
    #[arg(long = "kind", default_value = "All")]
    kind: KindSelector,

    /// Report candidates without deleting; pass --dry-run=false to delete
    #[arg(long = "dry-run", action = ArgAction::Set, num_args = 0..=1, default_value_t = true, default_missing_value = "true")]
    dry_run: bool,

    /// Finished jobs kept per job group
    #[arg(long = "max-count", default_value_t = 10)]
    max_count: usize,

    /// Manifest directories (comma-separated, repeatable)
    #[arg(long = "directories", value_delimiter = ',')]
    directories: Vec<PathBuf>,

    /// Extra protected object as Kind/name (repeatable)
    #[arg(long = "protect")]
    protect: Vec<String>,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t = Output::Human)]
    output: Output,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

fn init_tracing() {
    let env = std::env::var("KPRUNE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KPRUNE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KPRUNE_METRICS_ADDR; expected host:port");
        }
    }
}

fn protection_table(entries: &[String]) -> Result<ProtectionTable> {
    let mut table = ProtectionTable::default();
    for raw in entries {
        let (kind, name) = ProtectionTable::parse_entry(raw)
            .with_context(|| format!("invalid --protect {raw:?}; expected Kind/name"))?;
        table.insert(kind, name);
    }
    Ok(table)
}

fn print_human(report: &ReconcileReport) {
    let tag = if report.dry_run { " [dry-run]" } else { "" };
    let ns = &report.namespace;
    for w in &report.warnings {
        eprintln!("warning: {w}");
    }
    for k in &report.kinds {
        for name in &k.candidates {
            println!("- {} {}/{}{}", k.kind, ns, name, tag);
        }
        println!(
            "{}: live={} declared={} protected={} orphans={} deleted={}",
            k.kind,
            k.live,
            k.declared,
            k.protected.len(),
            k.candidates.len(),
            k.deleted
        );
    }
    if let Some(jobs) = &report.jobs {
        for p in &jobs.plans {
            println!("- Job {}/{} (group {}){}", ns, p.job, p.group, tag);
            for pod in &p.pods {
                println!("  - Pod {}/{}{}", ns, pod, tag);
            }
        }
        println!(
            "Jobs: candidates={} pods={} jobs_deleted={} pods_deleted={}",
            jobs.plans.len(),
            jobs.pod_candidates().len(),
            jobs.jobs_deleted,
            jobs.pods_deleted
        );
    }
    if report.dry_run && report.total_candidates() > 0 {
        println!("dry run: nothing deleted; rerun with --dry-run=false to prune");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let protection = protection_table(&cli.protect)?;
    let live = KubeLive::connect(cli.kubeconfig.as_deref(), cli.context.as_deref())
        .await
        .context("connecting to cluster")?;
    let namespace = resolve_namespace(cli.namespace.as_deref(), Some(live.default_namespace()));
    info!(ns = %namespace, kind = %cli.kind, dry_run = cli.dry_run, dirs = cli.directories.len(), "kprunectl invoked");

    let mut opts = ReconcileOptions::new(namespace, cli.directories);
    opts.selector = cli.kind;
    opts.dry_run = cli.dry_run;
    opts.retention = RetentionPolicy::with_retain(cli.max_count);
    opts.protection = protection;

    let report = match Reconciler::new(&live).run(&opts).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "reconcile failed");
            return Err(e).context("reconcile pass aborted");
        }
    };

    match cli.output {
        Output::Human => print_human(&report),
        Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
