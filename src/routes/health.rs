use std::time::Instant;

use actix_web::{HttpResponse, web};
use serde_json::json;

/// Process start, registered as app data so `/api/health` can report uptime.
#[derive(Clone, Copy)]
pub struct StartedAt(pub Instant);

impl StartedAt {
    pub fn now() -> Self {
        StartedAt(Instant::now())
    }
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "SquadUp API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health(started: web::Data<StartedAt>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "status": "healthy",
        "uptime": started.0.elapsed().as_secs_f64(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};

    #[actix_web::test]
    async fn banner_is_public() {
        let app = test::init_service(App::new().route("/", web::get().to(index))).await;
        let resp: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/").to_request())
                .await;
        assert_eq!(resp["success"], true);
    }

    #[actix_web::test]
    async fn health_reports_uptime() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(StartedAt::now()))
                .route("/api/health", web::get().to(health)),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(resp["status"], "healthy");
        assert!(resp["uptime"].as_f64().unwrap() >= 0.0);
    }
}
