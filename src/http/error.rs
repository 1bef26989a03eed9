use rouille::Response;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    MethodNotAllowed,
    /// carries the clip size for the `Content-Range` header
    RangeNotSatisfiable(u64),
    TooManyRequests,
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ApiError::NotFound("Audio file not found".into()),
            _ => {
                log::error!("Error serving audio: {err}");
                ApiError::Internal("Internal server error".into())
            }
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::MethodNotAllowed => 405,
            ApiError::RangeNotSatisfiable(_) => 416,
            ApiError::TooManyRequests => 429,
            ApiError::Internal(_) => 500,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Internal(msg) => msg,
            ApiError::MethodNotAllowed => "Method not allowed",
            ApiError::RangeNotSatisfiable(_) => "Range not satisfiable",
            ApiError::TooManyRequests => "Too many requests",
        }
    }

    pub fn into_response(self) -> Response {
        let response = Response::json(&ErrorBody {
            error: self.message(),
        })
        .with_status_code(self.status_code());

        match self {
            ApiError::RangeNotSatisfiable(size) => {
                response.with_unique_header("Content-Range", format!("bytes */{size}"))
            }
            ApiError::MethodNotAllowed => response.with_unique_header("Allow", "GET, OPTIONS"),
            _ => response,
        }
    }
}
