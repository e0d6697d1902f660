use {
    hyper::{
        Request, Response,
        body::{Body, Incoming},
        server::conn::http1,
        service::service_fn,
    },
    hyper_util::{
        rt::TokioIo,
        server::graceful::{GracefulShutdown, Watcher},
    },
    std::{convert::Infallible, error::Error, future::Future, io, net::SocketAddr, pin::pin},
    tokio::{
        io::{AsyncRead, AsyncWrite},
        net::TcpListener,
    },
    tracing::{debug, info, warn},
};

/// Serves HTTP/1 requests of one connection until the peer goes away or
/// `watcher` asks it to finish.
async fn serve_connection<C, H, Fut, B>(io: C, peer: SocketAddr, handler: H, watcher: Watcher)
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    H: Fn(Request<Incoming>) -> Fut,
    Fut: Future<Output = Result<Response<B>, Infallible>>,
    B: Body + 'static,
    <B as Body>::Error: Error + Send + Sync,
{
    let connection = http1::Builder::new()
        .keep_alive(true)
        .serve_connection(TokioIo::new(io), service_fn(handler));
    let Err(err) = watcher.watch(connection).await else {
        debug!(%peer, "connection closed");
        return;
    };
    let io_kind = err
        .source()
        .and_then(|source| source.downcast_ref::<io::Error>())
        .map(io::Error::kind);
    match io_kind {
        Some(io::ErrorKind::NotConnected | io::ErrorKind::ConnectionReset) => {
            debug!(%peer, ?err, "connection reset by peer");
        }
        Some(_) => warn!(%peer, ?err, "I/O error while serving"),
        None if err.is_incomplete_message() => debug!(%peer, ?err, "interrupted request"),
        None => warn!(%peer, ?err, "failed to serve HTTP"),
    }
}

/// Accepts connections until `shutdown` resolves, serving each one on its own task.
///
/// After `shutdown`, idle connections are closed and the function returns once
/// the requests that were already in progress have been answered.
pub async fn serve<H, Fut, B>(listener: TcpListener, handler: H, shutdown: impl Future<Output = ()>)
where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Response<B>, Infallible>> + Send + 'static,
    B: Body + Send + 'static,
    <B as Body>::Data: Send,
    <B as Body>::Error: Error + Send + Sync,
{
    let graceful = GracefulShutdown::new();
    let mut shutdown = pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        handler.clone(),
                        graceful.watcher(),
                    ));
                }
                Err(err) => warn!(?err, "failed to accept"),
            },
            () = &mut shutdown => {
                info!("no longer accepting connections");
                break;
            }
        }
    }
    drop(listener);
    graceful.shutdown().await;
    info!("all connections finished");
}
