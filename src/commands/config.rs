use anyhow::Result;
use log::debug;

use crate::{
    config::{API_TOKEN_VAR, ClientConfig},
    http::ApiClient,
    runtime::Runtime,
};

pub struct Config<R: Runtime> {
    pub runtime: R,
    pub client: ApiClient,
}

impl<R: Runtime> Config<R> {
    /// Builds the client from the environment. `base_url` overrides
    /// `API_URL`, `token` overrides `API_TOKEN`.
    pub fn new(runtime: R, base_url: Option<String>, token: Option<String>) -> Result<Self> {
        let client_config = ClientConfig::from_env_with(&runtime, base_url)?;
        let client = ApiClient::new(client_config)?;

        if let Some(token) = token.or_else(|| runtime.env_var(API_TOKEN_VAR).ok()) {
            debug!("Using bearer token for authentication");
            client.set_auth_token(token);
        }

        Ok(Self { runtime, client })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{API_URL_VAR, APP_ENV_VAR};
    use crate::runtime::MockRuntime;
    use mockito::{Matcher, Server};

    fn mock_runtime(token: Option<&str>) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        let token = token.map(|t| t.to_string());

        runtime
            .expect_env_var()
            .with(mockall::predicate::eq(APP_ENV_VAR))
            .returning(|_| Ok("test".to_string()));
        runtime
            .expect_env_var()
            .with(mockall::predicate::eq(API_URL_VAR))
            .returning(|_| Err(std::env::VarError::NotPresent));
        runtime
            .expect_env_var()
            .with(mockall::predicate::eq(API_TOKEN_VAR))
            .returning(move |_| token.clone().ok_or(std::env::VarError::NotPresent));
        runtime
    }

    /// Helper function to verify Authorization header behavior
    /// - `token`: Some(token) to test with API_TOKEN set, None to test without
    async fn verify_authorization_header(token: Option<&str>) {
        let mut server = Server::new_async().await;

        let expected_header = match token {
            Some(t) => Matcher::Exact(format!("Bearer {}", t)),
            None => Matcher::Missing,
        };

        let mock = server
            .mock("GET", "/me")
            .match_header("Authorization", expected_header)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let config = Config::new(mock_runtime(token), Some(server.url()), None).unwrap();
        let _: serde_json::Value = config
            .client
            .get("/me", None, Default::default())
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_config_new_with_api_token() {
        verify_authorization_header(Some("test_token")).await;
    }

    #[tokio::test]
    async fn test_config_new_without_api_token() {
        verify_authorization_header(None).await;
    }

    #[test]
    fn test_config_explicit_token_wins() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .with(mockall::predicate::eq(APP_ENV_VAR))
            .returning(|_| Err(std::env::VarError::NotPresent));

        let config = Config::new(
            runtime,
            Some("https://api.example.com".to_string()),
            Some("cli-token".to_string()),
        )
        .unwrap();
        assert_eq!(config.client.auth_token().as_deref(), Some("cli-token"));
        assert_eq!(config.client.base_url(), "https://api.example.com");
    }

    #[test]
    fn test_config_production_without_url_fails() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .with(mockall::predicate::eq(APP_ENV_VAR))
            .returning(|_| Ok("production".to_string()));
        runtime
            .expect_env_var()
            .with(mockall::predicate::eq(API_URL_VAR))
            .returning(|_| Err(std::env::VarError::NotPresent));

        let err = Config::new(runtime, None, None).err().unwrap();
        assert!(err.to_string().contains("API_URL"));
    }
}
