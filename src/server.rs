use actix_web::{HttpRequest, error, web};

use crate::error::AppError;
use crate::routes::{admin, bookings, experts, health, messages, projects, users};

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::bad_request(err.to_string()).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::bad_request(err.to_string()).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::bad_request(err.to_string()).into()
}

/// Extractor errors render with the same envelope as handler errors.
pub fn extractor_config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error));
}

/// Every REST route under `/api`, except the WebSocket upgrade.
pub fn rest_scope(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health))
        .service(web::scope("/users").configure(users::configure))
        .service(web::scope("/experts").configure(experts::configure))
        .service(web::scope("/bookings").configure(bookings::configure))
        .service(web::scope("/messages").configure(messages::configure))
        .service(web::scope("/projects").configure(projects::configure))
        .service(web::scope("/admin").configure(admin::configure));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenVerifier;
    use crate::auth::tests::{SECRET, token_for};
    use crate::routes::health::StartedAt;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(TokenVerifier::from_secret(SECRET)))
                    .app_data(web::Data::new(StartedAt::now()))
                    .configure(extractor_config)
                    .service(web::scope("/api").configure(rest_scope)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn health_is_public() {
        let app = app!();
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn protected_routes_need_a_token() {
        let app = app!();
        for uri in [
            "/api/users/profile",
            "/api/bookings",
            "/api/projects",
            "/api/messages/unread/count",
            "/api/admin/stats",
        ] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn expired_token_is_rejected() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/bookings")
            .insert_header(("Authorization", format!("Bearer {}", token_for("ada", -3600))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn malformed_json_is_a_bad_request() {
        async fn echo(body: web::Json<serde_json::Value>) -> actix_web::HttpResponse {
            actix_web::HttpResponse::Ok().json(body.into_inner())
        }

        let app = test::init_service(
            App::new()
                .configure(extractor_config)
                .route("/echo", web::post().to(echo)),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/echo")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }
}
