use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;

/// Body served on `/`, naming the workload that answered
pub fn greeting(identity: &str) -> String {
    format!("Hello from {}", identity)
}

fn respond(req: &Request<Body>, identity: &str) -> Response<Body> {
    let mut response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/") | (&Method::HEAD, "/") => Response::new(Body::from(greeting(identity))),
        (&Method::GET, "/healthz") => Response::new(Body::from("ok")),
        _ => {
            let mut not_found = Response::new(Body::from("not found"));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            not_found
        }
    };
    if req.method() == Method::HEAD {
        *response.body_mut() = Body::empty();
    }
    response
}

pub async fn serve(identity: String, port: u16) -> Result<(), hyper::Error> {
    let identity = Arc::new(identity);

    let make_svc = make_service_fn(move |_| {
        let identity = identity.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req: Request<Body>| {
                let identity = identity.clone();
                async move {
                    log::debug!("{} {}", req.method(), req.uri().path());
                    Ok::<_, hyper::Error>(respond(&req, &identity))
                }
            }))
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server = Server::bind(&addr).serve(make_svc);
    log::info!("Echo target listening on http://{}", addr);
    server.await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, path: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_names_the_pod() {
        let response = respond(&request(Method::GET, "/"), "p2");
        assert_eq!(response.status(), StatusCode::OK);

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"Hello from p2");
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let response = respond(&request(Method::GET, "/peers"), "p2");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let response = respond(&request(Method::HEAD, "/"), "p2");
        assert_eq!(response.status(), StatusCode::OK);

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert!(body.is_empty());
    }
}
