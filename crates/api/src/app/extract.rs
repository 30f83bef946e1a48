//! Extractors whose rejections are rendered as `bind.error` envelopes.

use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::{async_trait, Json};
use serde::de::DeserializeOwned;

use crate::app::errors::ApiError;

pub const APP_KEY_HEADER: &str = "x-app-key";

/// JSON body; any decoding failure becomes `bind.error`.
#[derive(Debug)]
pub struct BindJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for BindJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::warn!(reason = %rejection.body_text(), "request body rejected");
                Err(ApiError::bind())
            }
        }
    }
}

#[derive(Debug)]
pub struct BindQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for BindQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::warn!(reason = %rejection.body_text(), "query string rejected");
                Err(ApiError::bind())
            }
        }
    }
}

/// The application key an application backend presents on `/verify`.
///
/// Missing, empty or non-UTF-8 headers are a `bind.error`; whether the key is
/// registered is decided later.
#[derive(Debug)]
pub struct AppKeyHeader(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AppKeyHeader
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(APP_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(ApiError::bind)?;
        Ok(Self(key.to_string()))
    }
}
