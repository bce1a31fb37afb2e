//! Static page handlers.

use actix_web::{HttpRequest, HttpResponse};

use crate::error::{AppError, AppResult};

/// The browser client, embedded at compile time so the binary is
/// self-contained.
const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Serves the main client page.
pub async fn index() -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML))
}

/// Catch-all for unmatched routes.
pub async fn not_found(req: HttpRequest) -> AppResult<HttpResponse> {
    Err(AppError::NotFound(format!(
        "No route for {} {}",
        req.method(),
        req.path()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn test_index_serves_html() {
        let response = index().await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert!(INDEX_HTML.contains("<html"));
    }

    #[actix_web::test]
    async fn test_unknown_route_is_not_found() {
        let req = actix_web::test::TestRequest::get()
            .uri("/no-such-page")
            .to_http_request();
        let err = not_found(req).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
