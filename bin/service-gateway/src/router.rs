//! Maps gateway requests to routes

use hyper::{Method, StatusCode};
use service_core::CoreError;

const CALL_PREFIX: &str = "/call/";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Health,
    Metrics,
    Services,
    /// Call `service` with `url`, the rest of the path plus the query
    Call { service: String, url: String },
}

impl Route {
    /// Match a request. Unknown paths give 404, known paths with the wrong
    /// method give 405.
    pub fn resolve(method: &Method, path: &str, query: Option<&str>) -> Result<Self, StatusCode> {
        let route = match path {
            "/healthz" => Route::Health,
            "/metrics" => Route::Metrics,
            "/services" => Route::Services,
            _ => {
                let rest = path.strip_prefix(CALL_PREFIX).ok_or(StatusCode::NOT_FOUND)?;
                let (service, remainder) = rest.split_once('/').unwrap_or((rest, ""));
                if service.is_empty() {
                    return Err(StatusCode::NOT_FOUND);
                }

                let mut url = format!("/{}", remainder);
                if let Some(query) = query.filter(|q| !q.is_empty()) {
                    url.push('?');
                    url.push_str(query);
                }
                Route::Call {
                    service: service.to_string(),
                    url,
                }
            }
        };

        let allowed = match route {
            Route::Call { .. } => *method == Method::GET || *method == Method::POST,
            _ => *method == Method::GET,
        };
        if !allowed {
            return Err(StatusCode::METHOD_NOT_ALLOWED);
        }
        Ok(route)
    }
}

/// HTTP status reported for a failed call
pub fn status_for(error: &CoreError) -> StatusCode {
    match error {
        CoreError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::UnsupportedProtocol { .. } => StatusCode::NOT_IMPLEMENTED,
        CoreError::BackendCallFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_routes() {
        assert_eq!(Route::resolve(&Method::GET, "/healthz", None), Ok(Route::Health));
        assert_eq!(Route::resolve(&Method::GET, "/metrics", None), Ok(Route::Metrics));
        assert_eq!(Route::resolve(&Method::GET, "/services", None), Ok(Route::Services));
        assert_eq!(
            Route::resolve(&Method::POST, "/services", None),
            Err(StatusCode::METHOD_NOT_ALLOWED)
        );
        assert_eq!(Route::resolve(&Method::GET, "/other", None), Err(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_call_route() {
        assert_eq!(
            Route::resolve(&Method::GET, "/call/echo/ping/deep", Some("x=1")),
            Ok(Route::Call {
                service: "echo".to_string(),
                url: "/ping/deep?x=1".to_string(),
            })
        );
        assert_eq!(
            Route::resolve(&Method::POST, "/call/echo", None),
            Ok(Route::Call {
                service: "echo".to_string(),
                url: "/".to_string(),
            })
        );
        assert_eq!(Route::resolve(&Method::GET, "/call/", None), Err(StatusCode::NOT_FOUND));
        assert_eq!(
            Route::resolve(&Method::PUT, "/call/echo/ping", None),
            Err(StatusCode::METHOD_NOT_ALLOWED)
        );
    }

    #[test]
    fn test_status_for_errors() {
        assert_eq!(status_for(&CoreError::ServiceNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&CoreError::UnsupportedProtocol {
                service: "x".into(),
                protocol: "grpc".into(),
            }),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            status_for(&CoreError::BackendCallFailed {
                service: "x".into(),
                reason: "refused".into(),
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&CoreError::ConfigParse("bad".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
