use {
    crate::{
        auth::{Sessions, User},
        config::Config,
        error::ApiError,
        handler::{Context, HandlerResult},
        storage::Storage,
        util::{Body, Query, file_id_from_path},
    },
    anyhow::{Context as _, Result},
    filegate_protocol::endpoints::{
        DOWNLOAD_PREFIX, FILES_PATH, FILES_PREFIX, LOGIN_PATH, LOGOUT_PATH, ME_PATH,
        RENAME_PREFIX, SHARE_PREFIX, STAT_PREFIX, UPLOAD_DIRECT_PATH, UPLOAD_PATH,
    },
    filegate_sdk::{crypto::Transport, server::serve as serve_listener, signal::wait_for_shutdown},
    hyper::{Method, Request, Response, body::Incoming, header::AUTHORIZATION},
    std::{convert::Infallible, future::Future, sync::Arc, time::Instant},
    tokio::net::TcpListener,
    tracing::{debug, info, warn},
};

pub mod auth;
pub mod config;
pub mod error;
mod fetch;
pub mod form;
pub mod handler;
pub mod storage;
pub mod util;

/// Builds the request context from the config.
pub fn context(config: &Config) -> Result<Context> {
    let storage = Storage::new(config.storage_path.clone(), config.max_file_size.as_u64())
        .context("failed to open storage")?;

    let transport = Transport::from_secret(config.envelope_secret.as_ref());
    if transport.is_capable() {
        info!("encrypted transport is enabled");
    } else {
        warn!("no envelope secret configured, encrypted requests will be rejected");
    }

    if config.password_hash.is_none() {
        warn!("no password hash configured, using the development password");
    }
    let jwt_secret = match &config.jwt_secret {
        Some(secret) => secret.as_bytes().to_vec(),
        None => {
            warn!("no JWT secret configured, tokens will not survive a restart");
            rand::random::<[u8; 32]>().to_vec()
        }
    };
    let sessions = Sessions::new(
        config.username.clone(),
        config.password_hash.clone(),
        &jwt_secret,
        config.token_lifetime,
    );

    Ok(Context {
        storage: Arc::new(storage),
        transport: Arc::new(transport),
        sessions: Arc::new(sessions),
        http: reqwest::Client::builder()
            .build()
            .context("failed to create HTTP client")?,
        max_part_size: config.max_part_size.as_u64(),
    })
}

/// Serves on `config.bind_addr` until SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    serve(&config, listener, wait_for_shutdown()).await
}

/// Serves on an already bound listener until `shutdown` resolves and the
/// requests in progress have been answered.
pub async fn serve(
    config: &Config,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let ctx = context(config)?;
    let addr = listener.local_addr()?;
    info!(%addr, "listening");
    serve_listener(
        listener,
        move |request| handle_request(ctx.clone(), request),
        shutdown,
    )
    .await;
    Ok(())
}

async fn handle_request(
    ctx: Context,
    request: Request<Incoming>,
) -> Result<Response<Body>, Infallible> {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let response = match try_handle_request(ctx, request).await {
        Ok(response) => response,
        Err(err) => {
            if err.status().is_server_error() {
                warn!(?err, %method, %path, "request failed");
            } else {
                debug!(%err, %method, %path, "request rejected");
            }
            err.into_response()
        }
    };
    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis(),
        "handled request"
    );
    Ok(response)
}

fn authenticate(ctx: &Context, request: &Request<Incoming>) -> Result<User, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    Ok(ctx.sessions.authenticate_header(header)?)
}

async fn try_handle_request(ctx: Context, request: Request<Incoming>) -> HandlerResult {
    let path = request.uri().path().to_owned();
    let method = request.method().clone();
    let query = Query::parse(request.uri().query());

    if path == "/" {
        return if method == Method::GET {
            handler::root()
        } else {
            Err(ApiError::MethodNotAllowed)
        };
    }
    if path == LOGIN_PATH {
        return if method == Method::POST {
            handler::login(ctx, request).await
        } else {
            Err(ApiError::MethodNotAllowed)
        };
    }

    if path != LOGOUT_PATH && path != ME_PATH && !path.starts_with("/api/") {
        return Err(ApiError::UnknownRoute);
    }
    let user = authenticate(&ctx, &request)?;

    if path == LOGOUT_PATH {
        allow(&method, &Method::POST)?;
        handler::logout(&user)
    } else if path == ME_PATH {
        allow(&method, &Method::GET)?;
        handler::me(&user)
    } else if path == UPLOAD_PATH {
        allow(&method, &Method::POST)?;
        handler::upload(ctx, request).await
    } else if path == UPLOAD_DIRECT_PATH {
        allow(&method, &Method::POST)?;
        handler::upload_direct(ctx, request).await
    } else if path == FILES_PATH {
        allow(&method, &Method::GET)?;
        handler::list(&ctx, &query)
    } else if let Some(id) = path.strip_prefix(DOWNLOAD_PREFIX) {
        allow(&method, &Method::GET)?;
        handler::download(&ctx, &file_id_from_path(id)?, &query)
    } else if let Some(id) = path.strip_prefix(STAT_PREFIX) {
        allow(&method, &Method::GET)?;
        handler::stat(&ctx, &file_id_from_path(id)?, &query)
    } else if let Some(id) = path.strip_prefix(RENAME_PREFIX) {
        allow(&method, &Method::POST)?;
        handler::rename(ctx, request, file_id_from_path(id)?, query).await
    } else if let Some(id) = path.strip_prefix(SHARE_PREFIX) {
        allow(&method, &Method::POST)?;
        handler::toggle_share(&ctx, &file_id_from_path(id)?, &query)
    } else if let Some(id) = path.strip_prefix(FILES_PREFIX) {
        allow(&method, &Method::DELETE)?;
        handler::delete(&ctx, &file_id_from_path(id)?, &query)
    } else {
        Err(ApiError::UnknownRoute)
    }
}

/// Checked before the path is parsed any further.
fn allow(method: &Method, expected: &Method) -> Result<(), ApiError> {
    if method == expected {
        Ok(())
    } else {
        Err(ApiError::MethodNotAllowed)
    }
}
