//! Helpers for running a gateway in-process against a temporary storage root.

use {
    anyhow::{Context as _, Result},
    filegate_protocol::EnvelopeSecret,
    filegate_sdk::{
        client::{Client, ServerError},
        crypto::Codec,
    },
    filegate_server::config::Config,
    portpicker::pick_unused_port,
    std::{
        convert::Infallible,
        net::{Ipv4Addr, SocketAddr},
    },
    tempfile::TempDir,
    tokio::{net::TcpListener, sync::oneshot, task::JoinHandle},
    tracing::warn,
    tracing_subscriber::{EnvFilter, util::SubscriberInitExt},
    url::Url,
};

pub use filegate_server;

pub const SECRET: &str = "correct horse battery staple";
pub const USERNAME: &str = "admin";
/// Accepted because the test config has no password hash.
pub const PASSWORD: &str = "admin";

pub fn init_logging() {
    let _already_set = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            EnvFilter::try_new("info,filegate_server=debug").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish()
        .try_init();
}

async fn bind() -> Result<TcpListener> {
    let port = pick_unused_port().context("failed to pick port")?;
    Ok(TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await?)
}

/// Gateway running on a local port until dropped.
pub struct TestServer {
    pub url: Url,
    pub config: Config,
    _dir: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Starts a gateway. `configure` can adjust the config before start.
    pub async fn start(configure: impl FnOnce(&mut Config)) -> Result<Self> {
        init_logging();
        let dir = TempDir::new()?;
        let listener = bind().await?;
        let addr = listener.local_addr()?;

        let mut config = Config::new(addr, dir.path().to_path_buf());
        config.jwt_secret = Some("test jwt secret".into());
        configure(&mut config);

        let (tx, rx) = oneshot::channel();
        let server_config = config.clone();
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(err) = filegate_server::serve(&server_config, listener, shutdown).await {
                warn!(?err, "test server failed");
            }
        });

        Ok(Self {
            url: format!("http://{addr}/").parse()?,
            config,
            _dir: dir,
            shutdown: Some(tx),
            task,
        })
    }

    /// Gateway with encrypted transport enabled.
    pub async fn with_secret() -> Result<Self> {
        Self::start(|config| config.envelope_secret = Some(EnvelopeSecret::new(SECRET))).await
    }

    pub async fn plaintext() -> Result<Self> {
        Self::start(|_| {}).await
    }

    pub fn client(&self) -> Result<Client> {
        Client::new(self.url.clone())
    }

    /// Client holding the shared secret's key.
    pub fn encrypting_client(&self) -> Result<Client> {
        Ok(self.client()?.with_codec(codec()))
    }

    pub async fn logged_in(&self, client: Client) -> Result<Client> {
        let mut client = client;
        client.login(USERNAME, PASSWORD).await?;
        Ok(client)
    }

    pub fn path_url(&self, path: &str) -> Result<Url> {
        Ok(self.url.join(path)?)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.task.abort();
    }
}

pub fn codec() -> Codec {
    Codec::new(&EnvelopeSecret::new(SECRET).derive_key())
}

/// Status of a failed gateway call.
pub fn status_of(err: &anyhow::Error) -> Option<u16> {
    err.downcast_ref::<ServerError>()
        .map(|err| err.status.as_u16())
}

/// Plain HTTP server answering every request with `content`.
pub async fn serve_content(content: bytes::Bytes) -> Result<(Url, oneshot::Sender<()>)> {
    let listener = bind().await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(filegate_sdk::server::serve(
        listener,
        move |_request| {
            let content = content.clone();
            async move {
                Ok::<_, Infallible>(hyper::Response::new(http_body_util::Full::new(content)))
            }
        },
        async {
            let _ = rx.await;
        },
    ));
    Ok((format!("http://{addr}/file.bin").parse()?, tx))
}
