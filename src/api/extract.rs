//! Extractors whose rejections render as [`ThrottleError`] JSON
//!
//! Malformed bodies and query strings come back with the same
//! `{detail, error_code, status}` shape as a spec that fails validation.

use crate::error::ThrottleError;
use axum::extract::{FromRequest, FromRequestParts};

/// `Json<T>` with a `ThrottleError` rejection
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ThrottleError))]
pub struct ApiJson<T>(pub T);

/// `Query<T>` with a `ThrottleError` rejection
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ThrottleError))]
pub struct ApiQuery<T>(pub T);
