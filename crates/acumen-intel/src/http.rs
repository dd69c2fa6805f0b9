use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use acumen_types::AcumenError;

// ---------------------------------------------------------------------------
// Shared POST-JSON transport for all collaborator clients
// ---------------------------------------------------------------------------

/// POST a JSON body and decode a JSON response, mapping transport and HTTP
/// failures onto the collaborator error taxonomy.
pub(crate) async fn post_json<B, T>(
    client: &reqwest::Client,
    service: &'static str,
    url: &str,
    body: &B,
    timeout: Duration,
) -> Result<T, AcumenError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let resp = client
        .post(url)
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(|e| AcumenError::Collaborator {
            service: service.to_string(),
            status: 0,
            message: e.to_string(),
            retryable: true,
        })?;

    let status = resp.status();
    tracing::debug!(service, url, status = status.as_u16(), "collaborator response");
    let response_body = resp.text().await.map_err(|e| AcumenError::Collaborator {
        service: service.to_string(),
        status: 0,
        message: e.to_string(),
        retryable: true,
    })?;

    if !status.is_success() {
        return Err(map_error(service, status, &response_body));
    }

    serde_json::from_str(&response_body).map_err(|e| AcumenError::Collaborator {
        service: service.to_string(),
        status: status.as_u16(),
        message: format!("Failed to parse response JSON: {e}"),
        retryable: false,
    })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(service: &str, status: reqwest::StatusCode, body: &str) -> AcumenError {
    let status_u16 = status.as_u16();
    match status_u16 {
        401 => AcumenError::CollaboratorAuth {
            service: service.to_string(),
        },
        429 => AcumenError::Collaborator {
            service: service.to_string(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        500..=599 => AcumenError::Collaborator {
            service: service.to_string(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => AcumenError::Collaborator {
            service: service.to_string(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> reqwest::StatusCode {
        reqwest::StatusCode::from_u16(code).unwrap()
    }

    #[test]
    fn unauthorized_maps_to_auth_error() {
        let err = map_error("scoring", status(401), "{}");
        assert!(matches!(err, AcumenError::CollaboratorAuth { .. }));
        assert_eq!(err.http_status(), Some(401));
    }

    #[test]
    fn rate_limit_is_retryable() {
        let err = map_error("scoring", status(429), r#"{"error":"slow down"}"#);
        assert!(err.is_transient());
        match err {
            AcumenError::Collaborator {
                status, message, ..
            } => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            _ => panic!("expected collaborator error"),
        }
    }

    #[test]
    fn server_errors_are_retryable() {
        for code in [500, 502, 503] {
            let err = map_error("reasoning", status(code), "upstream exploded");
            assert!(err.is_transient(), "{code} should be retryable");
        }
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let err = map_error("validation", status(422), r#"{"error":"bad shape"}"#);
        assert!(!err.is_transient());
        match err {
            AcumenError::Collaborator { retryable, .. } => assert!(!retryable),
            _ => panic!("expected collaborator error"),
        }
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(extract_error_message("not json"), "not json");
        assert_eq!(
            extract_error_message(r#"{"error":"structured"}"#),
            "structured"
        );
    }
}
