use anyhow::{Context, Result};
use log::debug;
use serde_json::Value;

use super::config::Config;
use super::{describe, parse_query, print_json};
use crate::http::RequestOptions;
use crate::runtime::Runtime;

/// Verbs that carry a JSON body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Post,
    Put,
    Patch,
}

/// Fetches `path` and prints the response.
#[tracing::instrument(skip(config, query))]
pub async fn get<R: Runtime>(config: &Config<R>, path: &str, query: &[String]) -> Result<()> {
    let params = parse_query(query)?;
    let params = (!params.is_empty()).then_some(&params);
    let value: Value = config
        .client
        .get(path, params, RequestOptions::default())
        .await
        .map_err(describe)?;
    print_json(&value)
}

/// Sends `data` (a JSON document) with `mutation` and prints the response.
#[tracing::instrument(skip(config, data))]
pub async fn send<R: Runtime>(
    config: &Config<R>,
    mutation: Mutation,
    path: &str,
    data: Option<&str>,
) -> Result<()> {
    let body: Option<Value> = data
        .map(|d| serde_json::from_str(d).context("Invalid JSON in --data"))
        .transpose()?;
    debug!("{:?} {} with body {:?}", mutation, path, body);

    let client = &config.client;
    let options = RequestOptions::default();
    let value: Value = match mutation {
        Mutation::Post => client.post::<Value, _>(path, body.as_ref(), options).await,
        Mutation::Put => client.put::<Value, _>(path, body.as_ref(), options).await,
        Mutation::Patch => client.patch::<Value, _>(path, body.as_ref(), options).await,
    }
    .map_err(describe)?;
    print_json(&value)
}

/// Deletes `path` and prints the response, if any.
#[tracing::instrument(skip(config))]
pub async fn delete<R: Runtime>(config: &Config<R>, path: &str) -> Result<()> {
    let value: Value = config
        .client
        .delete(path, RequestOptions::default())
        .await
        .map_err(describe)?;
    print_json(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockito::Matcher;

    fn config_for(base_url: String) -> Config<MockRuntime> {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .returning(|_| Err(std::env::VarError::NotPresent));
        Config::new(runtime, Some(base_url), None).unwrap()
    }

    #[tokio::test]
    async fn test_get_with_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/products")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("category".into(), "Electronics".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let config = config_for(server.url());
        let result = get(
            &config,
            "/products",
            &["category=Electronics".to_string(), "page=1".to_string()],
        )
        .await;

        mock.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_get_not_found_reports_code() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/products/9")
            .with_status(404)
            .create_async()
            .await;

        let config = config_for(server.url());
        let err = get(&config, "/products/9", &[]).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "HTTP 404: Not Found (HTTP_404, status 404)"
        );
    }

    #[tokio::test]
    async fn test_send_each_mutation() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for method in ["POST", "PUT", "PATCH"] {
            mocks.push(
                server
                    .mock(method, "/products/1")
                    .match_body(Matcher::Json(serde_json::json!({"stock": 3})))
                    .with_status(200)
                    .with_body(r#"{"ok": true}"#)
                    .create_async()
                    .await,
            );
        }

        let config = config_for(server.url());
        for mutation in [Mutation::Post, Mutation::Put, Mutation::Patch] {
            send(&config, mutation, "/products/1", Some(r#"{"stock": 3}"#))
                .await
                .unwrap();
        }

        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_send_rejects_invalid_json() {
        let config = config_for("http://127.0.0.1:1".to_string());
        let err = send(&config, Mutation::Post, "/orders", Some("{not json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[tokio::test]
    async fn test_delete_no_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/products/1")
            .with_status(204)
            .create_async()
            .await;

        let config = config_for(server.url());
        delete(&config, "/products/1").await.unwrap();
        mock.assert_async().await;
    }
}
