use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error};

use super::{HttpRequest, StubNode};
use crate::Result;

// request bodies larger than this are refused rather than buffered
const MAX_BODY: usize = 1024 * 1024;

type RespBody = Full<Bytes>;

/// An HTTP/1.1 server answering requests for one [`StubNode`].
///
/// Every accepted connection is served on its own tokio task.
pub struct StubServer {
    /// the node state shared by every connection
    node: Arc<StubNode>,
}

impl StubServer {
    /// Create a new `StubServer` serving `node`.
    pub fn new(node: StubNode) -> Self {
        StubServer {
            node: Arc::new(node),
        }
    }

    /// accepts connections on `listener` until the runtime shuts down.
    /// `listener` must already be in non-blocking mode.
    pub async fn run(self, listener: std::net::TcpListener) -> Result<()> {
        let listener = TcpListener::from_std(listener)?;
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Connection failed: {}", e);
                    continue;
                }
            };
            let node = Arc::clone(&self.node);
            tokio::spawn(async move {
                let service = service_fn(move |req| answer(Arc::clone(&node), peer_addr, req));
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    error!("Error on serving client {}: {}", peer_addr, e);
                }
            });
        }
    }
}

/// reads the whole request, lets the node answer it and turns the answer into a response
async fn answer(
    node: Arc<StubNode>,
    peer_addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<RespBody>, Infallible> {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    debug!("Receive request from {}: {} {}", peer_addr, method, path);

    let (status, body) = match Limited::new(req.into_body(), MAX_BODY).collect().await {
        Ok(collected) => match String::from_utf8(collected.to_bytes().to_vec()) {
            Ok(body) => node.handle(&HttpRequest {
                method,
                path,
                query,
                body,
            }),
            Err(_) => (400, "body is not valid UTF-8".to_string()),
        },
        Err(e) => (400, format!("could not read body: {}", e)),
    };
    debug!("Response sent to {}: {}", peer_addr, status);
    Ok(response(status, body))
}

fn response(status: u16, body: String) -> Response<RespBody> {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    resp
}
