//! Maps every failure to one [`ErrorKind`] and a displayable message.

use serde_json::Value as JsonValue;

use crate::{
    error::{BodyError, Failure, ProcessingError},
    ErrorKind, NormalizedError, TransportError,
};

/// Operation the caller was performing. Selects context-specific messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallContext {
    Login,
    Register,
    /// Uploading a label image for ingredient analysis.
    AnalyzeLabel,
    FetchHistory,
    DeleteHistory,
    FetchProfile,
    UpdateProfile,
    Generic,
}

impl CallContext {
    /// Authentication calls persist their side effects (tokens) before the
    /// response body is processed.
    pub fn is_authentication(self) -> bool {
        matches!(self, Self::Login | Self::Register)
    }

    fn unauthorized_message(self) -> &'static str {
        if self.is_authentication() {
            CREDENTIALS_INCORRECT
        } else {
            REQUEST_DATA_INVALID
        }
    }

    fn unprocessable_message(self) -> &'static str {
        match self {
            Self::Login => "Email or password format is invalid.",
            Self::Register => {
                "Registration data is invalid. Check the email format and password requirements."
            }
            Self::AnalyzeLabel => {
                "The label image could not be processed. Try a clearer photo of the nutrition label."
            }
            Self::UpdateProfile => "Profile data is invalid. Check the values and try again.",
            Self::FetchHistory | Self::DeleteHistory | Self::FetchProfile | Self::Generic => {
                REQUEST_DATA_INVALID
            }
        }
    }
}

pub const CREDENTIALS_INCORRECT: &str =
    "Credentials incorrect. Check your email and password and try again.";
pub const REQUEST_DATA_INVALID: &str = "Request data invalid. Check your input and try again.";
pub const CONNECTION_CLOSED_MESSAGE: &str =
    "The connection was closed unexpectedly. Please try again.";
pub const NETWORK_UNAVAILABLE_MESSAGE: &str =
    "Unable to reach the server. Check your internet connection and try again.";
pub const LIKELY_SUCCEEDED_MESSAGE: &str = "The operation likely succeeded, but its response \
     could not be processed. Refresh before retrying.";
pub const EMPTY_BODY_MESSAGE: &str = "Empty response body.";

/// Anything that can go wrong in a call, before normalization.
#[derive(Debug)]
pub enum Fault<'a> {
    /// Attempt-level failure from the pipeline.
    Failure(&'a Failure),
    /// Non-2xx response and whatever body text it carried.
    Status { status: u16, body: Option<&'a str> },
    /// Failure inside success-path processing.
    Processing(&'a ProcessingError),
}

/// Stateless classifier from [`Fault`] to [`NormalizedError`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ErrorNormalizer;

impl ErrorNormalizer {
    /// Deterministic: the same fault and context always give the same result.
    pub fn normalize(&self, fault: &Fault<'_>, context: CallContext) -> NormalizedError {
        match fault {
            Fault::Failure(failure) => Self::from_failure(failure),
            Fault::Status { status, body } => Self::from_status(*status, *body, context),
            Fault::Processing(err) => Self::from_processing(err),
        }
    }

    fn from_failure(failure: &Failure) -> NormalizedError {
        match failure {
            Failure::Timeout { message, .. } => NormalizedError::new(ErrorKind::Timeout, message),
            Failure::Transport(err) => Self::from_transport(err),
            Failure::Cancelled => {
                NormalizedError::new(ErrorKind::Cancelled, "The request was cancelled.")
            }
        }
    }

    fn from_transport(err: &TransportError) -> NormalizedError {
        use crate::TransportErrorKind as K;
        match err.kind {
            K::Timeout => {
                NormalizedError::new(ErrorKind::Timeout, crate::timeout::TIMEOUT_MESSAGE)
            }
            _ if err.is_connection_closed() => {
                NormalizedError::new(ErrorKind::ConnectionClosed, CONNECTION_CLOSED_MESSAGE)
            }
            K::Connect | K::Io | K::Closed => {
                NormalizedError::new(ErrorKind::NetworkUnavailable, NETWORK_UNAVAILABLE_MESSAGE)
            }
            K::Other => NormalizedError::new(
                ErrorKind::Unknown,
                format!("An unexpected error occurred: {}", err.message),
            ),
        }
    }

    fn from_status(status: u16, body: Option<&str>, context: CallContext) -> NormalizedError {
        let detail = body.and_then(extract_error_message);
        let (kind, canned) = match status {
            400..=499 => (ErrorKind::HttpClientError, client_error_message(status, context)),
            500..=599 => (ErrorKind::HttpServerError, server_error_message(status)),
            _ => (ErrorKind::Unknown, format!("Unexpected response (HTTP {status}).")),
        };
        let message = match &detail {
            Some(_) if status == 401 && context.is_authentication() => canned,
            Some(detail) if kind != ErrorKind::Unknown => detail.clone(),
            _ => canned,
        };
        NormalizedError::new(kind, message)
            .with_status(status)
            .with_server_detail(detail)
    }

    fn from_processing(err: &ProcessingError) -> NormalizedError {
        let (kind, detail) = match err {
            ProcessingError::Body(BodyError::Closed) => {
                (ErrorKind::ConnectionClosed, err.to_string())
            }
            ProcessingError::Body(BodyError::Read(inner)) => {
                (Self::from_transport(inner).kind(), err.to_string())
            }
            ProcessingError::Body(BodyError::TooLarge { .. }) | ProcessingError::Decode(_) => {
                (ErrorKind::MalformedResponse, err.to_string())
            }
            ProcessingError::MissingData(_) => (ErrorKind::InternalClientError, err.to_string()),
            ProcessingError::Other(_) => (ErrorKind::Unknown, err.to_string()),
        };
        NormalizedError::new(
            kind,
            format!("Failed to process successful response: {detail}"),
        )
    }
}

fn client_error_message(status: u16, context: CallContext) -> String {
    let message = match status {
        400 => "Invalid request. Check your input and try again.",
        401 => context.unauthorized_message(),
        403 => "You do not have permission to perform this action.",
        404 => "The requested resource was not found.",
        409 => "This resource already exists or conflicts with existing data.",
        422 => context.unprocessable_message(),
        429 => "Too many requests. Please wait a moment and try again.",
        _ => REQUEST_DATA_INVALID,
    };
    message.to_owned()
}

fn server_error_message(status: u16) -> String {
    let message = match status {
        502 => "Bad gateway. The server is temporarily unreachable; try again shortly.",
        503 => "The service is temporarily unavailable. Try again later.",
        504 => "The server timed out while processing the request. Try again later.",
        _ => "Internal server error. Please try again later.",
    };
    message.to_owned()
}

/// Finds a human-readable message in an error body.
///
/// Looks at `detail` (a string, or a list of `{loc, msg}` validation entries),
/// then `message`, `error` and `error_description`. The first usable field wins.
pub fn extract_error_message(body: &str) -> Option<String> {
    let json: JsonValue = serde_json::from_str(body).ok()?;
    let object = json.as_object()?;

    if let Some(detail) = object.get("detail") {
        match detail {
            JsonValue::String(text) if !text.trim().is_empty() => return Some(text.clone()),
            JsonValue::Array(entries) => {
                let joined = validation_entries(entries);
                if !joined.is_empty() {
                    return Some(joined);
                }
            }
            _ => {}
        }
    }

    ["message", "error", "error_description"]
        .into_iter()
        .filter_map(|key| object.get(key)?.as_str())
        .find(|text| !text.trim().is_empty())
        .map(str::to_owned)
}

/// Joins entries as `"<last loc segment>: <msg>. "`.
fn validation_entries(entries: &[JsonValue]) -> String {
    entries
        .iter()
        .filter_map(|entry| {
            let msg = entry.get("msg")?.as_str()?;
            let field = entry
                .get("loc")
                .and_then(JsonValue::as_array)
                .and_then(|loc| loc.last())
                .map(|segment| match segment {
                    JsonValue::String(name) => name.clone(),
                    other => other.to_string(),
                });
            Some(match field {
                Some(field) => format!("{field}: {msg}. "),
                None => format!("{msg}. "),
            })
        })
        .collect()
}
