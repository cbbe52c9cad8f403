/// JSON Schema 2020-12定義モジュール。
///
/// テーマ抽出サービスとの契約をJSON Schemaで定義し、実行時に検証を行います。
use serde_json::{Value, json};

/// スキーマ検証結果。
#[derive(Debug)]
pub(crate) struct ValidationResult {
    pub(crate) valid: bool,
    pub(crate) errors: Vec<String>,
}

impl ValidationResult {
    pub(crate) fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub(crate) fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// テーマ抽出レスポンスのスキーマ。
///
/// テーマは1〜3語の短いラベルで、空配列は「シグナルなし」を表す正当な
/// レスポンスです。長すぎるラベルの切り詰めはストア側で行います。
pub(crate) fn theme_response_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "themes": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["themes"]
    })
}

/// JSON Schemaでデータを検証する。
///
/// # Arguments
/// * `schema_json` - JSON Schema定義（JSON形式）
/// * `instance` - 検証対象のデータ（JSON形式）
///
/// # Returns
/// 検証結果
pub(crate) fn validate_json(schema_json: &Value, instance: &Value) -> ValidationResult {
    match jsonschema::validator_for(schema_json) {
        Ok(schema) => {
            if schema.is_valid(instance) {
                ValidationResult::valid()
            } else {
                // 簡易実装: 詳細なエラーメッセージは省略
                ValidationResult::invalid(vec!["Validation failed".to_string()])
            }
        }
        Err(e) => ValidationResult::invalid(vec![format!("Schema compilation error: {}", e)]),
    }
}
