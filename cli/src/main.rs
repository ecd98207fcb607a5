use axum_server::tls_rustls::RustlsConfig;
use clap::{Args, Parser, Subcommand};
use env_logger::{Builder, Env};
use ripfs::{
    admission::{self, PodRelocator},
    consts::{
        DEFAULT_CERTS_DIR, DEFAULT_IPFS_API, DEFAULT_NAMESPACE, DEFAULT_REGISTRY_ADDRESS,
        DEFAULT_REGISTRY_HOST, DEFAULT_WEBHOOK_ADDRESS,
    },
    errors::{GraphError, ImageError, NameError, StoreError},
    graph::{GraphReader, Reader},
    image::{ImageArchive, ImageName, MemoryImage, OciLayout},
    naming::{
        wait_for_peers, Bootstrap, CidMapper, NameMapper, SecretFetcher, StaticFetcher, Updater,
    },
    remote::RegistryClient,
    server, ImageWriter, KuboStore,
};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "ripfs", version, about = "Container images served from IPFS")]
struct Cli {
    /// Default log filter, overridden by RUST_LOG
    #[arg(long, global = true, env = "RIPFS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Kubo RPC endpoint
    #[arg(long, global = true, env = "RIPFS_IPFS_API", default_value = DEFAULT_IPFS_API)]
    ipfs_api: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve stored images over the registry API
    Serve(ServeArgs),
    /// Run the admission webhook and create the name map if needed
    Manager(ManagerArgs),
    /// Store an image and record it in the name map
    Add(AddArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "RIPFS_ADDRESS", default_value = DEFAULT_REGISTRY_ADDRESS)]
    address: SocketAddr,

    /// Don't wait for swarm peers before serving
    #[arg(long)]
    standalone: bool,
}

#[derive(Args)]
struct ManagerArgs {
    #[arg(long, env = "RIPFS_ADDRESS", default_value = DEFAULT_WEBHOOK_ADDRESS)]
    address: SocketAddr,

    /// Host that relocated images are pulled from
    #[arg(long, env = "RIPFS_REGISTRY", default_value = DEFAULT_REGISTRY_HOST)]
    registry: String,

    #[arg(long, env = "RIPFS_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Directory holding tls.crt and tls.key
    #[arg(long, env = "RIPFS_CERTS_DIR", default_value = DEFAULT_CERTS_DIR)]
    certs_dir: PathBuf,

    /// Seconds between swarm peer checks while bootstrapping
    #[arg(long, default_value_t = 5)]
    peer_interval: u64,
}

#[derive(Args)]
struct AddArgs {
    /// Image reference to pull, an OCI layout directory, or an image tarball
    source: String,

    /// Reference to record; defaults to the pulled reference, the layout's
    /// ref.name, or the archive's first repo tag
    #[arg(long)]
    name: Option<String>,

    #[arg(long, default_value = "linux")]
    os: String,

    #[arg(long, default_value = "amd64")]
    arch: String,

    #[arg(long)]
    variant: Option<String>,

    /// Naming key to publish under, instead of reading it from the cluster
    #[arg(long, env = "RIPFS_IPNS_KEY")]
    ipns_key: Option<String>,

    #[arg(long, env = "RIPFS_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no reference for image in {0:?}, pass --name")]
    Unnamed(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    let store = match KuboStore::builder().api_url(&cli.ipfs_api).build() {
        Ok(store) => Arc::new(store),
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Command::Serve(args) => serve(store, args).await,
        Command::Manager(args) => manager(store, args).await,
        Command::Add(args) => add(store, args).await,
    };
    if let Err(err) = result {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

async fn serve(store: Arc<KuboStore>, args: ServeArgs) -> Result<(), CliError> {
    if args.standalone {
        log::info!("standalone, not waiting for swarm peers");
    } else {
        wait_for_peers(&*store, Duration::from_secs(5), None).await?;
    }
    let reader: Arc<dyn Reader> = Arc::new(GraphReader::new(store));
    server::serve(args.address, reader).await?;
    Ok(())
}

async fn manager(store: Arc<KuboStore>, args: ManagerArgs) -> Result<(), CliError> {
    let keys = SecretFetcher::try_default(&args.namespace).await?;

    let bootstrap = Bootstrap::new(store.clone(), keys.clone())
        .interval(Duration::from_secs(args.peer_interval));
    tokio::spawn(async move {
        match bootstrap.run().await {
            Ok(key) => log::info!("name map ready under {}", key),
            Err(err) => log::error!("name map bootstrap failed: {}", err),
        }
    });

    let mapper: Arc<dyn CidMapper> = Arc::new(NameMapper::new(store, keys));
    let app = admission::router(Arc::new(PodRelocator::new(mapper, &args.registry)));

    let cert = args.certs_dir.join("tls.crt");
    let key = args.certs_dir.join("tls.key");
    if cert.is_file() && key.is_file() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let config = RustlsConfig::from_pem_file(&cert, &key).await?;
        log::info!("webhook listening on https://{}", args.address);
        axum_server::bind_rustls(args.address, config)
            .serve(app.into_make_service())
            .await?;
    } else {
        log::warn!(
            "no certificates in {:?}, serving the webhook without tls",
            args.certs_dir
        );
        let listener = tokio::net::TcpListener::bind(args.address).await?;
        log::info!("webhook listening on http://{}", listener.local_addr()?);
        axum::serve(listener, app).await?;
    }
    Ok(())
}

async fn load(args: &AddArgs) -> Result<Vec<(String, MemoryImage)>, CliError> {
    let path = Path::new(&args.source);
    if path.exists() {
        let images = if path.is_dir() {
            OciLayout::new(path).images().await?
        } else {
            ImageArchive::new(path).images().await?
        };
        let single = images.len() == 1;
        return images
            .into_iter()
            .map(|(name, image)| {
                let name = match (&args.name, name) {
                    (Some(flag), _) if single => flag.clone(),
                    (_, Some(name)) => name,
                    _ => return Err(CliError::Unnamed(args.source.clone())),
                };
                Ok((name, image))
            })
            .collect();
    }

    let reference = ImageName::parse(&args.source)?;
    let client = RegistryClient::builder()
        .platform(&args.os, &args.arch, args.variant.as_deref())
        .build()?;
    let image = client.pull(&reference).await?;
    let name = args.name.clone().unwrap_or_else(|| args.source.clone());
    Ok(vec![(name, image)])
}

async fn add(store: Arc<KuboStore>, args: AddArgs) -> Result<(), CliError> {
    let updater: Box<dyn Updater> = match &args.ipns_key {
        Some(key) => Box::new(NameMapper::new(store.clone(), StaticFetcher(key.clone()))),
        None => Box::new(NameMapper::new(
            store.clone(),
            SecretFetcher::try_default(&args.namespace).await?,
        )),
    };
    let writer = ImageWriter::new(store);
    for (name, image) in load(&args).await? {
        let root = writer.add_image(&image).await?;
        updater.update(&name, &root).await?;
        println!("{} {}", name, root);
    }
    Ok(())
}
