//! Identity directory spoken to as a JSON HTTP API.

use async_trait::async_trait;
use kairos_core::config::RemoteServiceConfig;
use kairos_core::constants::{DIRECTORY_COMMUNITIES_PATH, DIRECTORY_USERS_PATH};
use kairos_service::identity::{Directory, DirectoryError};
use reqwest::StatusCode;
use serde::Deserialize;

use super::error_body;
use crate::config::http_client;
use crate::error::AppResult;

#[derive(Debug, Deserialize)]
struct AdminFlag {
    admin: bool,
}

#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: reqwest::Client,
    remote: RemoteServiceConfig,
}

impl HttpDirectory {
    /// ## Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(remote: RemoteServiceConfig) -> AppResult<Self> {
        Ok(Self {
            client: http_client(&remote)?,
            remote,
        })
    }

    /// `GET` a resource; `None` when the directory does not know it.
    async fn fetch(&self, path: &str) -> Result<Option<reqwest::Response>, DirectoryError> {
        let response = self
            .client
            .get(self.remote.endpoint(path))
            .send()
            .await
            .map_err(|err| DirectoryError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DirectoryError::Rejected {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }
        Ok(Some(response))
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    #[tracing::instrument(skip(self))]
    async fn is_admin(
        &self,
        user_id: uuid::Uuid,
        community_id: uuid::Uuid,
    ) -> Result<bool, DirectoryError> {
        let path = format!("{DIRECTORY_COMMUNITIES_PATH}/{community_id}/admins/{user_id}");
        let Some(response) = self.fetch(&path).await? else {
            return Ok(false);
        };
        let flag = response
            .json::<AdminFlag>()
            .await
            .map_err(|err| DirectoryError::Transport(err.to_string()))?;
        Ok(flag.admin)
    }

    #[tracing::instrument(skip(self))]
    async fn user_exists(&self, user_id: uuid::Uuid) -> Result<bool, DirectoryError> {
        let path = format!("{DIRECTORY_USERS_PATH}/{user_id}");
        Ok(self.fetch(&path).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn directory(server: &MockServer) -> HttpDirectory {
        HttpDirectory::new(RemoteServiceConfig {
            base_url: format!("{}/", server.uri()),
            timeout_secs: 10,
        })
        .expect("client builds")
    }

    #[test_log::test(tokio::test)]
    async fn user_exists_follows_status() {
        let server = MockServer::start().await;
        let known = uuid::Uuid::now_v7();
        let broken = uuid::Uuid::now_v7();
        Mock::given(method("GET"))
            .and(path(format!("/users/{known}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": known })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/users/{broken}")))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let directory = directory(&server);

        assert_eq!(directory.user_exists(known).await, Ok(true));
        assert_eq!(directory.user_exists(uuid::Uuid::now_v7()).await, Ok(false));
        assert_eq!(
            directory.user_exists(broken).await,
            Err(DirectoryError::Rejected {
                status: 500,
                body: "boom".to_string(),
            })
        );
    }

    #[test_log::test(tokio::test)]
    async fn is_admin_reads_flag() {
        let server = MockServer::start().await;
        let community = uuid::Uuid::now_v7();
        let admin = uuid::Uuid::now_v7();
        let member = uuid::Uuid::now_v7();
        Mock::given(method("GET"))
            .and(path(format!("/communities/{community}/admins/{admin}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "admin": true })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/communities/{community}/admins/{member}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "admin": false })))
            .mount(&server)
            .await;
        let directory = directory(&server);

        assert_eq!(directory.is_admin(admin, community).await, Ok(true));
        assert_eq!(directory.is_admin(member, community).await, Ok(false));
        assert_eq!(
            directory.is_admin(uuid::Uuid::now_v7(), community).await,
            Ok(false)
        );
    }
}
