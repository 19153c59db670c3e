mod auth;
mod client_ip;
mod error;
mod handlers;

use crate::app_config::{AppConfig, Secret};
use crate::bootstrap::BootstrapLibrary;
use crate::provisioning::ProvisioningOrchestrator;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};
use std::sync::Arc;

pub struct ApiState {
    orchestrator: ProvisioningOrchestrator,
    bootstrap: BootstrapLibrary,
    device_update_token: Secret,
    admin_token: Secret,
    trust_forwarded_for: bool,
}

impl ApiState {
    pub fn new(orchestrator: ProvisioningOrchestrator, bootstrap: BootstrapLibrary, config: &AppConfig) -> Self {
        ApiState {
            orchestrator,
            bootstrap,
            device_update_token: config.status().device_update_token().clone(),
            admin_token: config.status().admin_token().clone(),
            trust_forwarded_for: config.server().trust_forwarded_for(),
        }
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    let device_routes = Router::new()
        .route("/status", post(handlers::report_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_device_token));

    let admin_routes = Router::new()
        .route("/devices/{id}/approval", put(handlers::set_approval))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin_token));

    Router::new()
        .route("/bootstrap", get(handlers::bootstrap))
        .route("/register", post(handlers::register))
        .route("/provision", get(handlers::provision))
        .route("/check-status", post(handlers::check_status))
        .route("/healthz", get(handlers::healthz))
        .merge(device_routes)
        .merge(admin_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::AppConfigBuilder;
    use crate::bootstrap::MemoryBootstrapStore;
    use crate::domain::{DeviceId, ProvisioningStatus, Serial};
    use crate::provisioning::Fixture;
    use crate::registry::DeviceStore;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode, header};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use test_log::test;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        fixture: Fixture,
    }

    impl TestApp {
        fn new() -> Self {
            TestApp::with_config(AppConfigBuilder::new().build())
        }

        fn with_config(config: AppConfig) -> Self {
            let fixture = Fixture::new();
            let bootstrap = BootstrapLibrary::new(Arc::new(MemoryBootstrapStore::from_iter([
                ("leak-detection", "#!/bin/bash\necho registering\n"),
                ("blank", "  \n"),
            ])));
            let state = Arc::new(ApiState::new(fixture.orchestrator.clone(), bootstrap, &config));
            TestApp {
                router: router(state),
                fixture,
            }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
            let mut request = request;
            if request.extensions().get::<ConnectInfo<SocketAddr>>().is_none() {
                request.extensions_mut().insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 40000))));
            }

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
            (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
        }

        async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri).header(header::CONTENT_TYPE, "application/json");
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }

            let (status, _, body) = self.send(builder.body(Body::from(body.to_string())).unwrap()).await;
            (status, serde_json::from_str(&body).unwrap_or(Value::Null))
        }

        async fn provision(&self, serial: &str, ip: [u8; 4]) -> (StatusCode, axum::http::HeaderMap, String) {
            let hash = Serial::sanitize(serial).unwrap().hash();
            let mut request = Request::builder()
                .uri(format!("/provision?device_hash={}", hash.as_str()))
                .body(Body::empty())
                .unwrap();
            request.extensions_mut().insert(ConnectInfo(SocketAddr::from((ip, 40000))));
            self.send(request).await
        }

        async fn register(&self, serial: &str) -> DeviceId {
            let (_, body) = self.call("POST", "/register", None, json!({ "serial": serial })).await;
            DeviceId::from(body["deviceId"].as_str().unwrap())
        }

        async fn approve(&self, id: &DeviceId) {
            let (status, _) = self
                .call("PUT", &format!("/devices/{}/approval", id), Some("admin-token"), json!({ "approved": true }))
                .await;
            assert_eq!(status, StatusCode::OK);
        }
    }

    #[test(tokio::test)]
    async fn register_returns_201_then_200() {
        let app = TestApp::new();

        let (first_status, first) = app.call("POST", "/register", None, json!({ "serial": "SN-001" })).await;
        let (second_status, second) = app.call("POST", "/register", None, json!({ "serial": "SN-001" })).await;

        assert_eq!(first_status, StatusCode::CREATED);
        assert_eq!(second_status, StatusCode::OK);
        assert_eq!(first["deviceId"], second["deviceId"]);
        assert_eq!(second["status"], "awaiting_approval");
    }

    #[test(tokio::test)]
    async fn register_rejects_blank_and_missing_serials() {
        let app = TestApp::new();

        let (blank, _) = app.call("POST", "/register", None, json!({ "serial": "\u{0007}  " })).await;
        let (missing, _) = app.call("POST", "/register", None, json!({})).await;

        assert_eq!(blank, StatusCode::BAD_REQUEST);
        assert_eq!(missing, StatusCode::BAD_REQUEST);
    }

    #[test(tokio::test)]
    async fn register_rejects_a_serial_of_the_wrong_type() {
        let app = TestApp::new();

        let (status, _) = app.call("POST", "/register", None, json!({ "serial": 5 })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.fixture.store.count().await.unwrap(), 0);
    }

    #[test(tokio::test)]
    async fn bootstrap_serves_the_script_of_a_tag() {
        let app = TestApp::new();

        let request = Request::builder().uri("/bootstrap?tag=leak-detection").body(Body::empty()).unwrap();
        let (status, headers, body) = app.send(request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/x-shellscript; charset=utf-8");
        assert_eq!(headers[header::CONTENT_DISPOSITION], "attachment; filename=\"register-leak-detection.sh\"");
        assert_eq!(body, "#!/bin/bash\necho registering\n");
    }

    #[test(tokio::test)]
    async fn bootstrap_without_a_tag_is_a_bad_request() {
        let app = TestApp::new();

        let (status, _, body) = app.send(Request::builder().uri("/bootstrap").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("'tag' query parameter is required"));
    }

    #[test(tokio::test)]
    async fn bootstrap_failures_answer_with_an_error_script() {
        let app = TestApp::new();

        let (missing, missing_headers, missing_body) =
            app.send(Request::builder().uri("/bootstrap?tag=unknown").body(Body::empty()).unwrap()).await;
        let (blank, _, blank_body) = app.send(Request::builder().uri("/bootstrap?tag=blank").body(Body::empty()).unwrap()).await;

        assert_eq!(missing, StatusCode::NOT_FOUND);
        assert_eq!(missing_headers[header::CONTENT_TYPE], "text/plain");
        assert!(missing_body.starts_with("#!/bin/bash\n# BOOTSTRAP FAILED at "));
        assert!(missing_body.contains("echo \"Requested Tag:\" 'unknown'"));
        assert!(missing_body.contains("'Script tag not found.'"));
        assert!(missing_body.ends_with("exit 1\n"));
        assert_eq!(blank, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(blank_body.contains("'Script content is empty or missing.'"));
    }

    #[test(tokio::test)]
    async fn provision_rejects_a_malformed_hash() {
        let app = TestApp::new();

        let request = Request::builder().uri("/provision?device_hash=xyz").body(Body::empty()).unwrap();
        let (status, _, _) = app.send(request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test(tokio::test)]
    async fn provision_for_an_unapproved_device_is_forbidden() {
        let app = TestApp::new();
        let id = app.register("SN-001").await;

        let (status, _, _) = app.provision("SN-001", [10, 0, 0, 1]).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        let record = app.fixture.record(&id).await;
        assert_eq!(record.status(), ProvisioningStatus::ApprovalPendingRequestReceived);
    }

    #[test(tokio::test)]
    async fn provision_serves_the_script_as_an_attachment() {
        let app = TestApp::new();
        let id = app.register("SN-001").await;
        app.approve(&id).await;

        let (status, headers, body) = app.provision("SN-001", [10, 0, 0, 1]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/x-shellscript; charset=utf-8");
        assert_eq!(headers[header::CONTENT_DISPOSITION], "attachment; filename=\"provision-SN-001.sh\"");
        assert!(body.contains(&format!("export DEVICE_ID='{}'", id)));
        assert!(body.contains("export DEVICE_SERIAL='SN-001'"));
    }

    #[test(tokio::test)]
    async fn second_provision_for_a_device_gets_429_with_retry_after() {
        let app = TestApp::new();
        let id = app.register("SN-001").await;
        app.approve(&id).await;

        app.provision("SN-001", [10, 0, 0, 1]).await;
        let (status, headers, _) = app.provision("SN-001", [10, 0, 0, 2]).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers[header::RETRY_AFTER], "60");
    }

    #[test(tokio::test)]
    async fn second_provision_from_one_ip_gets_429() {
        let app = TestApp::new();
        let first = app.register("SN-001").await;
        let second = app.register("SN-002").await;
        app.approve(&first).await;
        app.approve(&second).await;

        app.provision("SN-001", [10, 0, 0, 1]).await;
        let (status, headers, _) = app.provision("SN-002", [10, 0, 0, 1]).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers[header::RETRY_AFTER], "5");
    }

    #[test(tokio::test)]
    async fn forwarded_for_is_only_used_when_trusted() {
        let app = TestApp::with_config(AppConfigBuilder::new().trust_forwarded_for(true).build());
        let first = app.register("SN-001").await;
        let second = app.register("SN-002").await;
        app.approve(&first).await;
        app.approve(&second).await;
        let forwarded = |serial: &str, hop: &str| {
            Request::builder()
                .uri(format!("/provision?device_hash={}", Serial::sanitize(serial).unwrap().hash().as_str()))
                .header("x-forwarded-for", format!("203.0.113.7, {}", hop))
                .body(Body::empty())
                .unwrap()
        };

        let (first_status, _, _) = app.send(forwarded("SN-001", "198.51.100.1")).await;
        let (second_status, _, _) = app.send(forwarded("SN-002", "198.51.100.2")).await;

        assert_eq!(first_status, StatusCode::OK);
        assert_eq!(second_status, StatusCode::OK);
    }

    #[test(tokio::test)]
    async fn check_status_reports_waiting_then_the_script_url() {
        let app = TestApp::new();
        let id = app.register("SN-001").await;

        let (_, waiting) = app.call("POST", "/check-status", None, json!({ "deviceId": id })).await;
        app.approve(&id).await;
        let (_, approved) = app.call("POST", "/check-status", None, json!({ "deviceId": id })).await;

        assert_eq!(waiting, json!({ "status": "awaiting_approval" }));
        let hash = Serial::sanitize("SN-001").unwrap().hash();
        assert_eq!(
            approved,
            json!({
                "status": "approved",
                "scriptUrl": format!("https://provision.example.com/provision?device_hash={}", hash.as_str()),
            })
        );
    }

    #[test(tokio::test)]
    async fn check_status_of_an_unknown_device_is_404() {
        let app = TestApp::new();

        let (status, _) = app.call("POST", "/check-status", None, json!({ "deviceId": "missing" })).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test(tokio::test)]
    async fn status_requires_the_device_token() {
        let app = TestApp::new();
        let id = app.register("SN-001").await;

        let (missing, _) = app.call("POST", "/status", None, json!({ "deviceId": id })).await;
        let (wrong, _) = app.call("POST", "/status", Some("admin-token"), json!({ "deviceId": id })).await;

        assert_eq!(missing, StatusCode::FORBIDDEN);
        assert_eq!(wrong, StatusCode::FORBIDDEN);
    }

    #[test(tokio::test)]
    async fn status_completes_provisioning_and_merges_state() {
        let app = TestApp::new();
        let id = app.register("SN-001").await;
        app.approve(&id).await;
        app.provision("SN-001", [10, 0, 0, 1]).await;
        let instance_uuid = app.fixture.record(&id).await.provisioning_instance_uuid.unwrap();

        let (status, body) = app
            .call(
                "POST",
                "/status",
                Some("device-update-token"),
                json!({
                    "deviceId": id,
                    "provisioningStatus": "provisioning_complete",
                    "provisioningInstanceUuid": instance_uuid,
                    "state": { "leak_status": "dry" },
                }),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "provisioning_complete");
        let record = app.fixture.record(&id).await;
        assert!(record.commissioned);
        assert_eq!(record.state["leak_status"], "dry");
        assert_eq!(record.last_reported_status.as_deref(), Some("provisioning_complete"));
    }

    #[test(tokio::test)]
    async fn status_from_a_superseded_script_is_forbidden() {
        let app = TestApp::new();
        let id = app.register("SN-001").await;
        app.approve(&id).await;
        app.provision("SN-001", [10, 0, 0, 1]).await;

        let (status, _) = app
            .call(
                "POST",
                "/status",
                Some("device-update-token"),
                json!({
                    "deviceId": id,
                    "provisioningStatus": "provisioning_complete",
                    "provisioningInstanceUuid": "00000000-0000-4000-8000-000000000000",
                }),
            )
            .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test(tokio::test)]
    async fn approval_requires_the_admin_token() {
        let app = TestApp::new();
        let id = app.register("SN-001").await;

        let (status, _) = app
            .call("PUT", &format!("/devices/{}/approval", id), Some("device-update-token"), json!({ "approved": true }))
            .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!app.fixture.record(&id).await.approved_for_provisioning);
    }

    #[test(tokio::test)]
    async fn revoking_approval_returns_the_device_to_the_queue() {
        let app = TestApp::new();
        let id = app.register("SN-001").await;
        app.approve(&id).await;

        let (status, body) = app
            .call("PUT", &format!("/devices/{}/approval", id), Some("admin-token"), json!({ "approved": false }))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["approvedForProvisioning"], false);
        assert_eq!(body["status"], "awaiting_approval");
    }

    #[test(tokio::test)]
    async fn healthz_answers_ok() {
        let app = TestApp::new();

        let (status, _, body) = app.send(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
