use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

pub(crate) fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// A plain text response with an exact status code.
pub(crate) fn plaintext(msg: impl Into<String>, code: u16) -> Response {
    plaintext_with(msg, code, &[])
}

/// A plain text response that also carries protocol headers.
pub(crate) fn plaintext_with(
    msg: impl Into<String>,
    code: u16,
    headers: &[(&'static str, String)],
) -> Response {
    build(
        code,
        header::HeaderValue::from_static("text/plain"),
        Body::from(msg.into()),
        headers,
    )
}

impl IntoResponse for crate::state::ServerShutdown {
    fn into_response(self) -> Response {
        plaintext("Server is shutting down", 503)
    }
}

/// An `application/octet-stream` response carrying protocol headers.
pub(crate) fn octet(body: impl Into<Body>, code: u16, headers: &[(&'static str, String)]) -> Response {
    build(
        code,
        header::HeaderValue::from_static("application/octet-stream"),
        body.into(),
        headers,
    )
}

pub(crate) fn json<T: serde::Serialize>(value: &T) -> Response {
    match serde_json::to_string(value) {
        Ok(body) => build(
            200,
            header::HeaderValue::from_static("application/json"),
            Body::from(body),
            &[],
        ),
        Err(e) => {
            crate::error!("Failed to serialize response: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn build(
    code: u16,
    content_type: header::HeaderValue,
    body: Body,
    headers: &[(&'static str, String)],
) -> Response {
    let mut builder = Response::builder()
        .status(status(code))
        .header(header::CONTENT_TYPE, content_type);
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
