use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use tandem_schemas::{ApiResponse, UserId};

/// Header carrying the request-scoped identity. Every handler resolves the
/// acting user from the request; there is no default account.
pub const USER_HEADER: &str = "x-tandem-user";

/// Extractor for the acting user. Rejects with a 400 validation error when
/// the header is missing or blank.
#[derive(Debug)]
pub struct UserContext(pub UserId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiResponse<()>>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match raw {
            Some(value) => Ok(UserContext(UserId(value.to_string()))),
            None => Err((
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::err(format!(
                    "missing required {} header",
                    USER_HEADER
                ))),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<UserContext, StatusCode> {
        let (mut parts, _) = request.into_parts();
        UserContext::from_request_parts(&mut parts, &())
            .await
            .map_err(|(status, _)| status)
    }

    #[tokio::test]
    async fn resolves_user_from_header() {
        let request = Request::builder()
            .header(USER_HEADER, "usr_abc")
            .body(())
            .unwrap();

        let context = extract(request).await.unwrap();
        assert_eq!(context.0, UserId("usr_abc".to_string()));
    }

    #[tokio::test]
    async fn missing_header_is_a_validation_failure() {
        let request = Request::builder().body(()).unwrap();
        assert_eq!(extract(request).await.unwrap_err(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn blank_header_is_rejected() {
        let request = Request::builder()
            .header(USER_HEADER, "   ")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap_err(), StatusCode::BAD_REQUEST);
    }
}
