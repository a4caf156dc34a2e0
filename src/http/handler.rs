use crate::http::AppState;
use crate::models::{Author, AuthorName, AuthorNameEmptyError, Book, StoreError};
use crate::repositories::LibraryRepository;
use axum::BoxError;
use axum::body::{Body, Bytes};
use axum::extract::{Json, Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug)]
pub struct ApiSuccess<T: Serialize>(StatusCode, Json<ApiResponse<T>>);

impl<T: Serialize> ApiSuccess<T> {
    pub const fn new(status: StatusCode, data: T) -> Self {
        Self(status, Json(ApiResponse::new(status, data)))
    }
}

impl<T: Serialize> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> axum::response::Response {
        (self.0, self.1).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    status_code: u16,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    const fn new(status: StatusCode, data: T) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    UnprocessableEntity(String),
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::NotFound(msg) => {
                let status = StatusCode::NOT_FOUND;
                (status, Json(ApiResponse::new(status, msg))).into_response()
            }
            Self::UnprocessableEntity(msg) => {
                let status = StatusCode::UNPROCESSABLE_ENTITY;
                (status, Json(ApiResponse::new(status, msg))).into_response()
            }
            Self::InternalServerError(msg) => {
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                (status, Json(ApiResponse::new(status, msg))).into_response()
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AuthorNotFound | StoreError::BookNotFound => {
                Self::NotFound(err.to_string())
            }
            StoreError::Internal(cause) => {
                error!(error = ?cause, "repository failure");
                Self::InternalServerError("Internal server error".to_string())
            }
        }
    }
}

impl From<AuthorNameEmptyError> for ApiError {
    fn from(err: AuthorNameEmptyError) -> Self {
        Self::UnprocessableEntity(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterAuthorHttpRequest {
    name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterAuthorHttpResponse {
    id: i64,
}

impl From<Author> for RegisterAuthorHttpResponse {
    fn from(value: Author) -> Self {
        Self { id: value.id() }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthorHttpResponse {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Author> for AuthorHttpResponse {
    fn from(value: Author) -> Self {
        Self {
            id: value.id(),
            name: value.name().to_string(),
            created_at: value.created_at(),
            updated_at: value.updated_at(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeAuthorHttpRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddBookHttpRequest {
    name: String,
    author_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookHttpRequest {
    name: String,
    author_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct BookHttpResponse {
    id: i64,
    name: String,
    author_ids: Vec<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Book> for BookHttpResponse {
    fn from(value: Book) -> Self {
        Self {
            id: value.id(),
            name: value.name().to_string(),
            author_ids: value.author_ids().to_vec(),
            created_at: value.created_at(),
            updated_at: value.updated_at(),
        }
    }
}

pub async fn register_author<R: LibraryRepository>(
    State(state): State<AppState<R>>,
    Json(body): Json<RegisterAuthorHttpRequest>,
) -> Result<ApiSuccess<RegisterAuthorHttpResponse>, ApiError> {
    let name = AuthorName::new(&body.name)?;
    state
        .repo
        .register_author(&name)
        .await
        .map_err(ApiError::from)
        .map(|author| ApiSuccess::new(StatusCode::CREATED, author.into()))
}

pub async fn change_author_info<R: LibraryRepository>(
    State(state): State<AppState<R>>,
    Path(id): Path<i64>,
    Json(body): Json<ChangeAuthorHttpRequest>,
) -> Result<ApiSuccess<()>, ApiError> {
    let name = AuthorName::new(&body.name)?;
    state
        .repo
        .change_author_info(id, &name)
        .await
        .map_err(ApiError::from)
        .map(|()| ApiSuccess::new(StatusCode::OK, ()))
}

pub async fn get_author_info<R: LibraryRepository>(
    State(state): State<AppState<R>>,
    Path(id): Path<i64>,
) -> Result<ApiSuccess<AuthorHttpResponse>, ApiError> {
    state
        .repo
        .get_author_info(id)
        .await
        .map_err(ApiError::from)
        .map(|author| ApiSuccess::new(StatusCode::OK, author.into()))
}

pub async fn add_book<R: LibraryRepository>(
    State(state): State<AppState<R>>,
    Json(body): Json<AddBookHttpRequest>,
) -> Result<ApiSuccess<BookHttpResponse>, ApiError> {
    let name = parse_book_name(&body.name)?;
    state
        .repo
        .add_book(name, &body.author_ids)
        .await
        .map_err(ApiError::from)
        .map(|book| ApiSuccess::new(StatusCode::CREATED, book.into()))
}

pub async fn update_book<R: LibraryRepository>(
    State(state): State<AppState<R>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBookHttpRequest>,
) -> Result<ApiSuccess<()>, ApiError> {
    let name = parse_book_name(&body.name)?;
    state
        .repo
        .update_book(id, name, &body.author_ids)
        .await
        .map_err(ApiError::from)
        .map(|()| ApiSuccess::new(StatusCode::OK, ()))
}

pub async fn get_book<R: LibraryRepository>(
    State(state): State<AppState<R>>,
    Path(id): Path<i64>,
) -> Result<ApiSuccess<BookHttpResponse>, ApiError> {
    state
        .repo
        .get_book(id)
        .await
        .map_err(ApiError::from)
        .map(|book| ApiSuccess::new(StatusCode::OK, book.into()))
}

/// Streams the author's books as newline-delimited JSON. A failure once the
/// stream has started can only cut the response short; everything before it is
/// already on the wire.
pub async fn get_author_books<R: LibraryRepository>(
    State(state): State<AppState<R>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let books = state
        .repo
        .get_author_books(id)
        .await
        .map_err(ApiError::from)?;

    let lines = books.map(|item| -> Result<Bytes, BoxError> {
        let book = item?;
        let mut line = serde_json::to_vec(&BookHttpResponse::from(book))?;
        line.push(b'\n');
        Ok(Bytes::from(line))
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    ))
}

fn parse_book_name(raw: &str) -> Result<&str, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "Book name cannot be empty".to_string(),
        ));
    }
    Ok(trimmed)
}
