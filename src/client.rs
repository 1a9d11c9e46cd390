//! HTTP client for the image service endpoints used by the load test.

use crate::error::ClientError;
use crate::pipeline::ProcessRequest;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

const IMAGE_ID_PREFIX: &str = "image:";

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    image_id: Option<String>,
}

/// Thin wrapper over a shared `reqwest::Client`; cheap to clone into workers.
#[derive(Clone, Debug)]
pub struct ImageServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl ImageServiceClient {
    pub fn new(base_url: &Url, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register the test user. The service may already know it, so any status is accepted.
    pub async fn register(&self, username: &str, password: &str) -> Result<StatusCode, ClientError> {
        let path = "/register";
        let response = self
            .http
            .post(self.endpoint(path))
            .json(&Credentials { username, password })
            .send()
            .await
            .map_err(|e| ClientError::transport(path, e))?;

        Ok(response.status())
    }

    /// Log in and return the bearer token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ClientError> {
        let path = "/login";
        let response = self
            .http
            .post(self.endpoint(path))
            .json(&Credentials { username, password })
            .send()
            .await
            .map_err(|e| ClientError::transport(path, e))?;

        let body: LoginResponse = success_json(path, response).await?;
        match body.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(ClientError::malformed(path, "missing \"token\"")),
        }
    }

    /// Upload the fixture image and return its id with every `image:` marker removed.
    pub async fn upload_image(&self, token: &str, image_path: &Path) -> Result<String, ClientError> {
        if !image_path.exists() {
            return Err(ClientError::FixtureNotFound(image_path.to_path_buf()));
        }

        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|source| ClientError::FixtureUnreadable {
                path: image_path.to_path_buf(),
                source,
            })?;

        let path = "/images/upload";
        let part = Part::bytes(bytes)
            .file_name(image_path.to_string_lossy().into_owned())
            .mime_str(content_type_for(image_path))
            .map_err(|e| ClientError::transport(path, e))?;
        let form = Form::new().part("image", part);

        let response = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::transport(path, e))?;

        let body: UploadResponse = success_json(path, response).await?;
        let image_id = body
            .image_id
            .ok_or_else(|| ClientError::malformed(path, "missing \"imageId\""))?;

        let image_id = image_id.replace(IMAGE_ID_PREFIX, "");
        if image_id.is_empty() {
            return Err(ClientError::malformed(path, "missing \"imageId\""));
        }

        Ok(image_id)
    }

    /// Send one process request. Any HTTP status counts as a completed request.
    pub async fn process_image(
        &self,
        token: &str,
        image_id: &str,
        request: &ProcessRequest,
    ) -> Result<StatusCode, ClientError> {
        let path = format!("/images/{}/process", image_id);
        let response = self
            .http
            .post(self.endpoint(&path))
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::transport(&path, e))?;

        Ok(response.status())
    }
}

async fn success_json<T>(endpoint: &str, response: Response) -> Result<T, ClientError>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::UnexpectedStatus {
            endpoint: endpoint.to_string(),
            status,
            body,
        });
    }

    let raw = response
        .bytes()
        .await
        .map_err(|e| ClientError::transport(endpoint, e))?;
    serde_json::from_slice(&raw).map_err(|e| ClientError::malformed(endpoint, e.to_string()))
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ImageServiceClient {
        let url = Url::parse(&server.uri()).unwrap();
        ImageServiceClient::new(&url, Some(Duration::from_secs(5))).unwrap()
    }

    fn write_fixture(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let fixture = dir.path().join("test_image.jpg");
        std::fs::write(&fixture, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        fixture
    }

    #[tokio::test]
    async fn test_register_accepts_conflict() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/register"))
            .and(body_json(json!({"username": "testuser", "password": "testpassword"})))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&mock_server)
            .await;

        let status = client_for(&mock_server)
            .register("testuser", "testpassword")
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_login_returns_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "jwt-abc"})))
            .mount(&mock_server)
            .await;

        let token = client_for(&mock_server)
            .login("testuser", "testpassword")
            .await
            .unwrap();
        assert_eq!(token, "jwt-abc");
    }

    #[tokio::test]
    async fn test_login_rejects_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .login("testuser", "wrong")
            .await
            .unwrap_err();
        match err {
            ClientError::UnexpectedStatus { status, body, .. } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "bad credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_rejects_missing_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": "testuser"})))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .login("testuser", "testpassword")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_upload_strips_image_prefix() {
        let mock_server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let fixture = write_fixture(&dir);

        Mock::given(method("POST"))
            .and(path("/images/upload"))
            .and(header("authorization", "Bearer jwt-abc"))
            .and(header_exists("content-type"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"imageId": "image:1234-abcd.jpg"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let image_id = client_for(&mock_server)
            .upload_image("jwt-abc", &fixture)
            .await
            .unwrap();
        assert_eq!(image_id, "1234-abcd.jpg");

        let requests = mock_server.received_requests().await.unwrap();
        let content_type = requests[0]
            .headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
        let body = String::from_utf8_lossy(&requests[0].body).to_ascii_lowercase();
        assert!(body.contains("name=\"image\""));
        assert!(body.contains("content-type: image/jpeg"));
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_image_id() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = write_fixture(&dir);

        for image_id in ["", "image:"] {
            let mock_server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/images/upload"))
                .respond_with(
                    ResponseTemplate::new(201).set_body_json(json!({"imageId": image_id})),
                )
                .mount(&mock_server)
                .await;

            let err = client_for(&mock_server)
                .upload_image("jwt-abc", &fixture)
                .await
                .unwrap_err();
            assert!(
                matches!(err, ClientError::MalformedResponse { .. }),
                "imageId {image_id:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_upload_removes_every_image_marker() {
        let mock_server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let fixture = write_fixture(&dir);

        Mock::given(method("POST"))
            .and(path("/images/upload"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"imageId": "image:user-image:42.jpg"})),
            )
            .mount(&mock_server)
            .await;

        let image_id = client_for(&mock_server)
            .upload_image("jwt-abc", &fixture)
            .await
            .unwrap();
        assert_eq!(image_id, "user-42.jpg");
    }

    #[tokio::test]
    async fn test_upload_missing_fixture_sends_nothing() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .upload_image("jwt-abc", Path::new("/definitely/not/here.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::FixtureNotFound(_)));
    }

    #[tokio::test]
    async fn test_process_sends_pipeline_and_accepts_server_error() {
        let mock_server = MockServer::start().await;
        let request = Pipeline::cpu_heavy().request_for("1234-abcd.jpg");

        Mock::given(method("POST"))
            .and(path("/images/1234-abcd.jpg/process"))
            .and(header("authorization", "Bearer jwt-abc"))
            .and(body_json(serde_json::to_value(&request).unwrap()))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let status = client_for(&mock_server)
            .process_image("jwt-abc", "1234-abcd.jpg", &request)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_process_transport_error() {
        // Nothing listens on the discard port.
        let url = Url::parse("http://127.0.0.1:9").unwrap();
        let client = ImageServiceClient::new(&url, Some(Duration::from_secs(2))).unwrap();
        let request = Pipeline::cpu_heavy().request_for("x.jpg");

        let err = client
            .process_image("jwt-abc", "x.jpg", &request)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport { .. }));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.png")), "image/png");
        assert_eq!(content_type_for(Path::new("a.webp")), "image/webp");
        assert_eq!(content_type_for(Path::new("noext")), "image/jpeg");
    }
}
