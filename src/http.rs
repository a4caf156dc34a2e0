use crate::repositories::LibraryRepository;
use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod handler;

#[derive(Debug)]
pub struct AppState<R: LibraryRepository> {
    repo: Arc<R>,
}

impl<R: LibraryRepository> AppState<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo: Arc::new(repo),
        }
    }
}

impl<R: LibraryRepository> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

#[derive(Debug)]
pub struct HttpServerConfig {
    port: u16,
}

impl HttpServerConfig {
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self { port }
    }
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<R: LibraryRepository>(
        state: AppState<R>,
        config: HttpServerConfig,
    ) -> anyhow::Result<Self> {
        let router = Router::new()
            .nest("/api/v1", api_routes())
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port))
            .await
            .with_context(|| format!("Failed to bind to port {}", config.port))?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Received error from running server")?;
        Ok(())
    }
}

fn api_routes<R: LibraryRepository>() -> Router<AppState<R>> {
    Router::new()
        .route("/authors", post(handler::register_author::<R>))
        .route(
            "/authors/{id}",
            get(handler::get_author_info::<R>).patch(handler::change_author_info::<R>),
        )
        .route("/authors/{id}/books", get(handler::get_author_books::<R>))
        .route("/books", post(handler::add_book::<R>))
        .route(
            "/books/{id}",
            get(handler::get_book::<R>).put(handler::update_book::<R>),
        )
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown signal handler");
    }
}
