//! Admission-dispatcher serves the allow-all admission webhook.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use axum::Router;
use clap::{ArgMatches, Command};
use is_terminal::IsTerminal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use dispatcher::{Dispatcher, decide::AllowAll, scheme::Scheme};

/// GRACE is how long in-flight requests get to finish once shutdown starts.
const GRACE: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error("tracing_subscriber error: {0}")]
    TracingConfig(#[from] tracing_subscriber::filter::ParseError),
    #[error("tracing error: {0}")]
    Tracing(#[from] tracing::subscriber::SetGlobalDefaultError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("scheme error: {0}")]
    Scheme(#[from] dispatcher::scheme::SchemeError),
    #[error("missing argument: {0}")]
    MissingArg(&'static str),
    #[error("webhook path must start with '/': {0:?}")]
    BadPath(String),
}

type Result<T, E = Error> = std::result::Result<T, E>;

fn main() {
    use std::process;

    if let Err(e) = match cli().get_matches().subcommand() {
        Some(("run", m)) => Args::try_from(m).and_then(startup),
        _ => unreachable!(),
    } {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn cli() -> Command {
    use clap::{Arg, ValueHint, crate_authors, crate_description, crate_name, crate_version};

    Command::new(crate_name!())
        .version(crate_version!())
        .author(crate_authors!())
        .about(crate_description!())
        .subcommand_required(true)
        .subcommands([Command::new("run").about("run the webhook server").args([
            Arg::new("introspection_address")
                .long("introspection-bind-address")
                .help("address to bind for the HTTP introspection server")
                .default_value("[::]:8089"),
            Arg::new("webhook_address")
                .long("webhook-bind-address")
                .help("address to bind for the HTTP webhook server")
                .long_help(concat!(
                    "Address to bind for the HTTP webhook server.\n",
                    "If there's a TLS certificate and key at the files specified by ",
                    "`cert-dir`, `cert-name`, and `key-name` then HTTPS will be served."
                ))
                .default_value("[::]:8080"),
            Arg::new("webhook_path")
                .long("webhook-path")
                .help("path the admission webhook is served on")
                .default_value("/validate"),
            Arg::new("cert_dir")
                .long("cert-dir")
                .help("directory containing TLS cert+key pair")
                .value_hint(ValueHint::DirPath)
                .default_value(
                    std::env::temp_dir()
                        .join("k8s-webhook-server/serving-certs")
                        .into_os_string(),
                ),
            Arg::new("cert_name")
                .long("cert-name")
                .help("file inside `cert-dir` containing the TLS certificate")
                .default_value("tls.crt"),
            Arg::new("key_name")
                .long("key-name")
                .help("file inside `cert-dir` containing the TLS certificate key")
                .default_value("tls.key"),
        ])])
}

#[derive(Debug)]
struct Args {
    cert_dir: PathBuf,
    cert_name: String,
    introspection_address: SocketAddr,
    key_name: String,
    webhook_address: SocketAddr,
    webhook_path: String,
}

impl TryFrom<&ArgMatches> for Args {
    type Error = Error;

    fn try_from(m: &ArgMatches) -> Result<Self> {
        let get = |name: &'static str| {
            m.get_one::<String>(name)
                .cloned()
                .ok_or(Error::MissingArg(name))
        };
        let webhook_path = get("webhook_path")?;
        if !webhook_path.starts_with('/') {
            return Err(Error::BadPath(webhook_path));
        }
        Ok(Self {
            cert_dir: get("cert_dir")?.into(),
            cert_name: get("cert_name")?,
            introspection_address: get("introspection_address")?.parse()?,
            key_name: get("key_name")?,
            webhook_address: get("webhook_address")?.parse()?,
            webhook_path,
        })
    }
}

fn startup(args: Args) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tokio::{runtime, signal};
    use tracing_subscriber::{filter::EnvFilter, prelude::*};

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let collector = tracing_subscriber::Registry::default()
        .with(env_filter)
        .with(if std::io::stdout().is_terminal() {
            Some(tracing_subscriber::fmt::layer())
        } else {
            None
        })
        .with(if std::io::stdout().is_terminal() {
            None
        } else {
            Some(tracing_subscriber::fmt::layer().json())
        });
    tracing::subscriber::set_global_default(collector)?;

    // The scheme is built exactly once, before anything is served.
    let scheme = Scheme::admission()?;
    info!(?scheme, "scheme registered");
    let app = dispatcher::app(Dispatcher::new(scheme, AllowAll), &args.webhook_path);
    let prom = PrometheusBuilder::new().with_http_listener(args.introspection_address);

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let token = CancellationToken::new();
    rt.handle().spawn(async move {
        if let Err(e) = prom.install() {
            error!("error setting up prometheus endpoint: {e}");
        }
    });
    let stop = token.clone();
    rt.handle().spawn(async move {
        if let Err(err) = signal::ctrl_c().await {
            error!("error reading SIGINT: {err}");
        }
        stop.cancel();
    });
    rt.block_on(serve(
        app,
        args.webhook_address,
        args.cert_dir.join(&args.cert_name),
        args.cert_dir.join(&args.key_name),
        token,
    ))
}

async fn serve<A, Pa, Pb>(
    app: Router,
    addr: A,
    certfile: Pa,
    keyfile: Pb,
    cancel: CancellationToken,
) -> Result<()>
where
    A: Into<SocketAddr>,
    Pa: AsRef<Path>,
    Pb: AsRef<Path>,
{
    use axum_server::{
        Handle,
        tls_openssl::{OpenSSLConfig, bind_openssl},
    };

    let certfile = certfile.as_ref();
    let keyfile = keyfile.as_ref();
    let addr = addr.into();

    let handle = Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        cancel.cancelled().await;
        info!(grace = ?GRACE, "shutting down webhook server");
        shutdown.graceful_shutdown(Some(GRACE));
    });

    let svc = app.into_make_service();
    if certfile.exists() && keyfile.exists() {
        let config = OpenSSLConfig::from_pem_file(certfile, keyfile).map_err(std::io::Error::other)?;
        info!(%addr, tls = true, "started webhook server");
        bind_openssl(addr, config).handle(handle).serve(svc).await?;
    } else {
        info!(%addr, tls = false, "started webhook server");
        axum_server::bind(addr).handle(handle).serve(svc).await?;
    }
    Ok(())
}
