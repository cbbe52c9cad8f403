/// エラー分類とリトライ判定ユーティリティ。
use std::time::Duration;

use anyhow::Error;
use reqwest::StatusCode;
use sqlx::Error as SqlxError;

use crate::clients::InferenceError;

/// エラーの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    /// リトライ可能なエラー（一時的なネットワークエラー、タイムアウト、429/5xxなど）
    Retryable,
    /// クォータ枯渇。リトライせず即座に呼び出し元へ伝播する。
    QuotaExhausted,
    /// リトライ不可能なエラー（バリデーションエラーなど）
    NonRetryable,
    /// 致命的なエラー（認証エラー、設定エラーなど）
    Fatal,
}

/// エラーを分類する。
#[must_use]
pub(crate) fn classify_error(error: &Error) -> ErrorKind {
    // 推論サービス固有のエラーを最優先で判定
    if let Some(inference_err) = error.downcast_ref::<InferenceError>() {
        return match inference_err {
            InferenceError::Timeout | InferenceError::RateLimited { .. } => ErrorKind::Retryable,
            InferenceError::QuotaExhausted => ErrorKind::QuotaExhausted,
            InferenceError::Upstream { status } => classify_status(*status),
        };
    }

    // HTTPエラーの判定
    if let Some(reqwest_err) = error.downcast_ref::<reqwest::Error>() {
        if reqwest_err.is_timeout() || reqwest_err.is_connect() {
            return ErrorKind::Retryable;
        }

        if let Some(status) = reqwest_err.status() {
            return classify_status(status);
        }
    }

    // SQLxエラーの判定
    if let Some(sqlx_err) = error.downcast_ref::<SqlxError>() {
        match sqlx_err {
            SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
                return ErrorKind::Retryable;
            }
            SqlxError::RowNotFound => return ErrorKind::NonRetryable,
            SqlxError::Configuration(_) => return ErrorKind::Fatal,
            _ => {}
        }
    }

    // デフォルトはリトライ不可能
    ErrorKind::NonRetryable
}

fn classify_status(status: StatusCode) -> ErrorKind {
    match status {
        // 5xxエラーまたは429はリトライ可能
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Retryable,
        // 認証・認可エラーは致命的
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Fatal,
        _ => ErrorKind::NonRetryable,
    }
}

/// エラーがリトライ可能かどうかを判定する。
#[must_use]
pub(crate) fn is_retryable(error: &Error) -> bool {
    matches!(classify_error(error), ErrorKind::Retryable)
}

/// プロバイダが提示した再試行待機ヒントを取り出す。
#[must_use]
pub(crate) fn retry_hint(error: &Error) -> Option<Duration> {
    match error.downcast_ref::<InferenceError>() {
        Some(InferenceError::RateLimited {
            retry_after: Some(hint),
        }) => Some(*hint),
        _ => None,
    }
}
