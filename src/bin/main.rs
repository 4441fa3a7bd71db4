#[cfg(not(target_arch = "wasm32"))]
mod native {
    extern crate feedline;

    use actix_web::{web, App, HttpServer, HttpRequest, HttpResponse};
    use feedline::core::db::{Store, ensure_admin, init_test_data};
    use feedline::config;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    mod adapter {
        use actix_web::HttpRequest;
        use spin_sdk::http::{Request, Method};

        pub fn actix_to_spin_request(
            req: &HttpRequest,
            body: actix_web::web::Bytes,
        ) -> anyhow::Result<Request> {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                other => anyhow::bail!("unsupported method {}", other),
            };

            let uri = req.uri().to_string();
            let body_vec = body.to_vec();

            let mut req_builder = Request::builder();
            let method_set = req_builder.method(method);
            let uri_set = method_set.uri(&uri);

            // Copy headers
            let mut with_headers = uri_set;
            for (name, value) in req.headers() {
                if let Ok(val_str) = value.to_str() {
                    with_headers = with_headers.header(name.as_str(), val_str);
                }
            }

            Ok(with_headers.body(body_vec).build())
        }

        pub fn spin_to_actix_response(spin_resp: spin_sdk::http::Response) -> actix_web::HttpResponse {
            let status = *spin_resp.status();
            let body = spin_resp.body().to_vec();

            let mut response = actix_web::HttpResponse::build(
                actix_web::http::StatusCode::from_u16(status)
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            );

            if body.is_empty() {
                response.finish()
            } else {
                response.content_type("application/json").body(body)
            }
        }
    }

    fn init_logging() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("feedline=info,main=info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    pub async fn run() -> std::io::Result<()> {
        init_logging();

        let store = Store::memory();
        if let Some((email, password)) = config::admin_credentials() {
            ensure_admin(&store, &email, &password).map_err(std::io::Error::other)?;
        }
        if config::seed_demo_data() {
            init_test_data(&store).map_err(std::io::Error::other)?;
        }
        let store = web::Data::new(store);

        let addr = config::bind_addr();
        tracing::info!(%addr, "server listening");

        HttpServer::new(move || {
            App::new()
                .app_data(store.clone())
                .default_service(web::route().to(handle_all))
        })
        .bind(addr)?
        .run()
        .await
    }

    async fn handle_all(store: web::Data<Store>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
        let spin_req = match adapter::actix_to_spin_request(&req, body) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(error = %err, "could not adapt request");
                return HttpResponse::BadRequest()
                    .json(serde_json::json!({"error": "Invalid request"}));
            }
        };

        let response = feedline::route(&store, &spin_req);
        tracing::info!(
            method = %req.method(),
            path = %req.path(),
            status = *response.status(),
            "request handled"
        );
        adapter::spin_to_actix_response(response)
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
