// Classificazione uniforme degli errori di fetch
use std::fmt;

use chrono::{SecondsFormat, Utc};
use log::error;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Text carried by connection failures.
pub const NETWORK_ERROR_SENTINEL: &str = "Network Error";

/// Failure produced by the HTTP layer. Each variant says what went wrong,
/// so classification never has to sniff fields at runtime.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The server could not be reached at all.
    #[error("Network Error")]
    Network { reason: String },
    /// The request was sent but no answer arrived in time.
    #[error("timeout of {after_ms}ms exceeded")]
    Timeout { after_ms: u64 },
    /// The server answered with a non-success status.
    #[error("Request failed with status code {status}")]
    HttpStatus { status: u16, body: Value },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Timeout,
    Validation,
    NotFound,
    ServerError,
    Http(u16),
    Unknown,
    /// Store: loading the operator listing failed.
    Carregamento,
    /// Store: the search batch failed.
    Busca,
    /// Store: the expense detail failed.
    Despesas,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => f.write_str("NETWORK"),
            ErrorKind::Timeout => f.write_str("TIMEOUT"),
            ErrorKind::Validation => f.write_str("VALIDATION"),
            ErrorKind::NotFound => f.write_str("NOT_FOUND"),
            ErrorKind::ServerError => f.write_str("SERVER_ERROR"),
            ErrorKind::Http(code) => write!(f, "HTTP_{}", code),
            ErrorKind::Unknown => f.write_str("UNKNOWN"),
            ErrorKind::Carregamento => f.write_str("CARREGAMENTO"),
            ErrorKind::Busca => f.write_str("BUSCA"),
            ErrorKind::Despesas => f.write_str("DESPESAS"),
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
    pub details: String,
    /// ISO-8601, UTC.
    pub timestamp: String,
}

impl ErrorDescriptor {
    pub fn new(kind: ErrorKind, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: details.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if !self.details.is_empty() {
            write!(f, " ({})", self.details)?;
        }
        Ok(())
    }
}

fn server_detail(body: &Value) -> Option<&str> {
    body.get("detail").and_then(Value::as_str).filter(|d| !d.is_empty())
}

/// Current error plus the one it replaced.
#[derive(Debug, Clone, Default)]
pub struct ErrorHandler {
    current: Option<ErrorDescriptor>,
    previous: Option<ErrorDescriptor>,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a fetch failure to a descriptor; `None` in, `None` out.
    /// First match wins: network, timeout, HTTP status, anything else.
    pub fn classify(error: Option<&FetchError>) -> Option<ErrorDescriptor> {
        let error = error?;

        let descriptor = match error {
            FetchError::Network { .. } => network_descriptor(),
            FetchError::Other(message) if message == NETWORK_ERROR_SENTINEL => network_descriptor(),
            FetchError::Timeout { .. } => ErrorDescriptor::new(
                ErrorKind::Timeout,
                "A requisição demorou muito",
                "Tente novamente em alguns momentos",
            ),
            FetchError::HttpStatus { status, body } => match *status {
                400 => ErrorDescriptor::new(
                    ErrorKind::Validation,
                    server_detail(body).unwrap_or("Dados inválidos"),
                    "",
                ),
                404 => ErrorDescriptor::new(
                    ErrorKind::NotFound,
                    server_detail(body).unwrap_or("Recurso não encontrado"),
                    "",
                ),
                500 => ErrorDescriptor::new(
                    ErrorKind::ServerError,
                    "Erro no servidor",
                    "O servidor está temporariamente indisponível",
                ),
                other => {
                    let message = server_detail(body)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Erro {}", other));
                    ErrorDescriptor::new(ErrorKind::Http(other), message, "")
                }
            },
            FetchError::Other(message) => {
                let message = if message.is_empty() { "Erro desconhecido" } else { message.as_str() };
                ErrorDescriptor::new(ErrorKind::Unknown, message, "")
            }
        };

        error!("[{}] {}", descriptor.kind, descriptor.message);
        Some(descriptor)
    }

    /// Classifies `error` and makes it current; the old current moves to `previous`.
    pub fn set_error(&mut self, error: Option<&FetchError>) -> Option<&ErrorDescriptor> {
        let descriptor = Self::classify(error);
        self.record(descriptor);
        self.current.as_ref()
    }

    /// Stores an already-built descriptor with the same history shift as `set_error`.
    pub fn record(&mut self, descriptor: Option<ErrorDescriptor>) {
        self.previous = self.current.take();
        self.current = descriptor;
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&ErrorDescriptor> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&ErrorDescriptor> {
        self.previous.as_ref()
    }

    /// True when the current error differs in kind or message from the previous one.
    pub fn error_changed(&self) -> bool {
        match (&self.current, &self.previous) {
            (Some(c), Some(p)) => c.kind != p.kind || c.message != p.message,
            (None, None) => false,
            _ => true,
        }
    }
}

fn network_descriptor() -> ErrorDescriptor {
    ErrorDescriptor::new(
        ErrorKind::Network,
        "Não foi possível conectar ao servidor",
        "Verifique sua conexão com a internet",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn http(status: u16, body: Value) -> FetchError {
        FetchError::HttpStatus { status, body }
    }

    #[test]
    fn none_classifies_to_none() {
        assert!(ErrorHandler::classify(None).is_none());
    }

    #[test]
    fn network_failure_wins_regardless_of_reason() {
        let err = FetchError::Network { reason: "connection refused".into() };
        let d = ErrorHandler::classify(Some(&err)).unwrap();
        assert_eq!(d.kind, ErrorKind::Network);
        assert_eq!(err.to_string(), NETWORK_ERROR_SENTINEL);

        let sentinel = FetchError::Other(NETWORK_ERROR_SENTINEL.to_string());
        assert_eq!(ErrorHandler::classify(Some(&sentinel)).unwrap().kind, ErrorKind::Network);

        let almost = FetchError::Other("network error".to_string());
        assert_eq!(ErrorHandler::classify(Some(&almost)).unwrap().kind, ErrorKind::Unknown);
    }

    #[test]
    fn timeout_suggests_retry() {
        let d = ErrorHandler::classify(Some(&FetchError::Timeout { after_ms: 30_000 })).unwrap();
        assert_eq!(d.kind, ErrorKind::Timeout);
        assert_eq!(d.details, "Tente novamente em alguns momentos");
    }

    #[test]
    fn not_found_uses_server_detail() {
        let d = ErrorHandler::classify(Some(&http(404, json!({"detail": "not found"})))).unwrap();
        assert_eq!(d.kind, ErrorKind::NotFound);
        assert_eq!(d.message, "not found");

        let d = ErrorHandler::classify(Some(&http(404, Value::Null))).unwrap();
        assert_eq!(d.message, "Recurso não encontrado");
    }

    #[test]
    fn validation_falls_back_when_detail_is_not_text() {
        let d = ErrorHandler::classify(Some(&http(400, json!({"detail": [{"loc": ["q"]}]})))).unwrap();
        assert_eq!(d.kind, ErrorKind::Validation);
        assert_eq!(d.message, "Dados inválidos");
    }

    #[test]
    fn server_error_has_fixed_text() {
        let d = ErrorHandler::classify(Some(&http(500, json!({"detail": "boom"})))).unwrap();
        assert_eq!(d.kind, ErrorKind::ServerError);
        assert_eq!(d.message, "Erro no servidor");
        assert_eq!(d.details, "O servidor está temporariamente indisponível");
    }

    #[test]
    fn other_statuses_get_http_code_kind() {
        let d = ErrorHandler::classify(Some(&http(503, Value::Null))).unwrap();
        assert_eq!(d.kind, ErrorKind::Http(503));
        assert_eq!(d.kind.to_string(), "HTTP_503");
        assert_eq!(d.message, "Erro 503");

        let d = ErrorHandler::classify(Some(&http(422, json!({"detail": "limit too large"})))).unwrap();
        assert_eq!(d.message, "limit too large");
    }

    #[test]
    fn unknown_uses_own_message_or_fallback() {
        let d = ErrorHandler::classify(Some(&FetchError::Other("bad json".into()))).unwrap();
        assert_eq!(d.kind, ErrorKind::Unknown);
        assert_eq!(d.message, "bad json");
        let d = ErrorHandler::classify(Some(&FetchError::Other(String::new()))).unwrap();
        assert_eq!(d.message, "Erro desconhecido");
    }

    #[test]
    fn timestamp_is_iso8601() {
        let d = ErrorDescriptor::new(ErrorKind::Busca, "x", "");
        assert!(chrono::DateTime::parse_from_rfc3339(&d.timestamp).is_ok());
    }

    #[test]
    fn handler_keeps_one_slot_history() {
        let mut handler = ErrorHandler::new();
        assert!(handler.current().is_none());

        handler.set_error(Some(&http(404, json!({"detail": "a"}))));
        assert!(handler.previous().is_none());
        assert!(handler.error_changed());

        handler.set_error(Some(&http(404, json!({"detail": "a"}))));
        assert_eq!(handler.previous().map(|p| p.message.as_str()), Some("a"));
        assert!(!handler.error_changed());

        handler.set_error(Some(&FetchError::Timeout { after_ms: 1 }));
        assert!(handler.error_changed());
        assert_eq!(handler.previous().unwrap().kind, ErrorKind::NotFound);

        handler.clear();
        assert!(handler.current().is_none());
        assert_eq!(handler.previous().unwrap().kind, ErrorKind::NotFound);
    }

    #[test]
    fn kinds_serialize_as_tags() {
        let d = ErrorDescriptor::new(ErrorKind::Http(418), "teapot", "");
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["kind"], "HTTP_418");
    }
}
