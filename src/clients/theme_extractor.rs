/// テーマ抽出サービスのクライアント。
///
/// タイムアウト、レスポンススキーマ検証、JSON修復フォールバックをサポートします。
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema;
use crate::util::json::parse_with_repair;

/// 推論サービス呼び出しの失敗分類。
///
/// スケジューラのリトライ判定は `util::error::classify_error` が
/// この型へのダウンキャストで行う。
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("theme extraction request timed out")]
    Timeout,
    #[error("rate limited by inference service")]
    RateLimited { retry_after: Option<Duration> },
    #[error("inference quota exhausted")]
    QuotaExhausted,
    #[error("inference service returned status {status}")]
    Upstream { status: StatusCode },
}

/// テーマ抽出クライアントの設定。
#[derive(Debug, Clone)]
pub struct ThemeExtractorConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
    pub service_token: Option<String>,
    pub max_themes: usize,
}

#[derive(Debug, Serialize)]
struct ExtractThemesRequest<'a> {
    text: &'a str,
    max_themes: usize,
    language: &'a str,
}

/// テーマ抽出サービスとの通信を管理するクライアント。
#[derive(Debug, Clone)]
pub struct ThemeExtractorClient {
    client: Client,
    base_url: Url,
    service_token: Option<String>,
    max_themes: usize,
}

impl ThemeExtractorClient {
    /// 新しいテーマ抽出クライアントを作成する。
    ///
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(config: ThemeExtractorConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build theme-extractor HTTP client")?;

        let base_url = Url::parse(&config.base_url).context("invalid theme-extractor base URL")?;

        Ok(Self {
            client,
            base_url,
            service_token: config.service_token,
            max_themes: config.max_themes,
        })
    }

    /// テキストから短いトピックラベルを抽出する。
    ///
    /// 空レスポンスや検証に失敗したペイロードは「シグナルなし」として
    /// 空のリストで返します。失敗として伝播するのはトランスポート層の
    /// エラーのみです。
    ///
    /// # Errors
    /// タイムアウト、レートリミット、クォータ枯渇、5xx応答の場合は
    /// [`InferenceError`] を含むエラーを返します。
    pub async fn extract_themes(&self, text: &str) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let url = self
            .base_url
            .join("v1/themes/extract")
            .context("failed to build extract-themes URL")?;

        let request_body = ExtractThemesRequest {
            text,
            max_themes: self.max_themes,
            language: "en",
        };

        let mut request = self.client.post(url).json(&request_body);

        if let Some(ref token) = self.service_token {
            request = request.header("X-Service-Token", token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) if error.is_timeout() => {
                return Err(anyhow::Error::new(InferenceError::Timeout)
                    .context("theme extraction request timed out"));
            }
            Err(error) => {
                return Err(anyhow::Error::new(error).context("theme extraction request failed"));
            }
        };

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            if body.contains("insufficient_quota") {
                return Err(anyhow::Error::new(InferenceError::QuotaExhausted));
            }
            return Err(anyhow::Error::new(InferenceError::RateLimited {
                retry_after,
            }));
        }

        if !status.is_success() {
            return Err(anyhow::Error::new(InferenceError::Upstream { status }));
        }

        let payload = response
            .text()
            .await
            .context("failed to read theme-extractor response body")?;

        Ok(self.parse_themes(&payload))
    }

    /// レスポンスボディをテーマのリストへ変換する。
    ///
    /// パース失敗は一度だけ修復を試み、それでも読めない場合や
    /// スキーマ違反の場合は警告を出して空リストを返す。
    fn parse_themes(&self, payload: &str) -> Vec<String> {
        let value = match parse_with_repair(payload) {
            Ok(value) => value,
            Err(error) => {
                warn!(error = %error, "unparseable theme-extractor payload, treating as no signal");
                return Vec::new();
            }
        };

        let validation = schema::validate_json(&schema::theme_response_schema(), &value);
        if !validation.valid {
            warn!(
                errors = ?validation.errors,
                "theme-extractor payload failed schema validation"
            );
            return Vec::new();
        }

        let themes: Vec<String> = value
            .get("themes")
            .and_then(|themes| themes.as_array())
            .map(|themes| {
                themes
                    .iter()
                    .filter_map(|theme| theme.as_str())
                    .map(|theme| theme.trim().to_string())
                    .filter(|theme| !theme.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let mut seen = std::collections::HashSet::new();
        let themes: Vec<String> = themes
            .into_iter()
            .filter(|theme| seen.insert(theme.to_lowercase()))
            .take(self.max_themes)
            .collect();

        debug!(count = themes.len(), "extracted themes");
        themes
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> ThemeExtractorConfig {
        ThemeExtractorConfig {
            base_url,
            connect_timeout: Duration::from_secs(3),
            total_timeout: Duration::from_secs(10),
            service_token: Some("test-token".to_string()),
            max_themes: 5,
        }
    }

    #[tokio::test]
    async fn extract_themes_returns_labels() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "success": true,
            "themes": ["rust", "async runtime", "databases"]
        });

        Mock::given(method("POST"))
            .and(path("/v1/themes/extract"))
            .and(header("X-Service-Token", "test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&server)
            .await;

        let client = ThemeExtractorClient::new(test_config(server.uri())).expect("client builds");
        let themes = client
            .extract_themes("a long article body")
            .await
            .expect("extraction succeeds");

        assert_eq!(themes, vec!["rust", "async runtime", "databases"]);
    }

    #[tokio::test]
    async fn extract_themes_skips_empty_text() {
        let client = ThemeExtractorClient::new(test_config("http://localhost:9999".to_string()))
            .expect("client builds");
        let themes = client.extract_themes("   ").await.expect("no-op succeeds");
        assert!(themes.is_empty());
    }

    #[tokio::test]
    async fn code_fenced_payload_is_repaired() {
        let server = MockServer::start().await;

        let fenced = "```json\n{\"success\": true, \"themes\": [\"rust\"]}\n```";
        Mock::given(method("POST"))
            .and(path("/v1/themes/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fenced))
            .mount(&server)
            .await;

        let client = ThemeExtractorClient::new(test_config(server.uri())).expect("client builds");
        let themes = client.extract_themes("body").await.expect("succeeds");
        assert_eq!(themes, vec!["rust"]);
    }

    #[tokio::test]
    async fn malformed_payload_degrades_to_no_signal() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/themes/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = ThemeExtractorClient::new(test_config(server.uri())).expect("client builds");
        let themes = client.extract_themes("body").await.expect("succeeds");
        assert!(themes.is_empty());
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_hint() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/themes/extract"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "12")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let client = ThemeExtractorClient::new(test_config(server.uri())).expect("client builds");
        let error = client.extract_themes("body").await.expect_err("must fail");

        match error.downcast_ref::<InferenceError>() {
            Some(InferenceError::RateLimited { retry_after }) => {
                assert_eq!(*retry_after, Some(Duration::from_secs(12)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn quota_exhaustion_is_distinct_from_rate_limit() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/themes/extract"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_string(r#"{"error": {"code": "insufficient_quota"}}"#),
            )
            .mount(&server)
            .await;

        let client = ThemeExtractorClient::new(test_config(server.uri())).expect("client builds");
        let error = client.extract_themes("body").await.expect_err("must fail");

        assert!(matches!(
            error.downcast_ref::<InferenceError>(),
            Some(InferenceError::QuotaExhausted)
        ));
    }

    #[tokio::test]
    async fn duplicate_themes_are_collapsed() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "success": true,
            "themes": ["Rust", "rust", "  ", "tokio"]
        });

        Mock::given(method("POST"))
            .and(path("/v1/themes/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&server)
            .await;

        let client = ThemeExtractorClient::new(test_config(server.uri())).expect("client builds");
        let themes = client.extract_themes("body").await.expect("succeeds");
        assert_eq!(themes, vec!["Rust", "tokio"]);
    }
}
