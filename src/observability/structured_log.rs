/// 構造化JSON形式ログ。
use serde_json::{Value, json};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// ログエントリに常に付与されるサービス識別子。
const SERVICE_NAME: &str = "interest-worker";

/// 重要イベント（INFO以上）を1行JSONで出力するレイヤー。
///
/// fmtレイヤーと併用され、ログ集約側はこちらの `service` フィールドで
/// ワーカーを識別する。DEBUG/TRACEは出力しない。
pub(crate) struct StructuredLogLayer;

impl<S: Subscriber> Layer<S> for StructuredLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !is_significant(event.metadata().level()) {
            return;
        }

        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let entry = render_entry(event.metadata(), collector);
        eprintln!("{}", serde_json::to_string(&entry).unwrap_or_default());
    }
}

fn is_significant(level: &Level) -> bool {
    matches!(*level, Level::ERROR | Level::WARN | Level::INFO)
}

/// イベントのフィールドを収集する。`message` はトップレベルへ持ち上げ、
/// 残りは `fields` マップへ入れる。
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: serde_json::Map<String, Value>,
}

impl FieldCollector {
    fn insert(&mut self, name: &str, value: Value) {
        if name == "message" {
            if let Value::String(text) = value {
                self.message = Some(text);
            } else {
                self.message = Some(value.to_string());
            }
        } else {
            self.fields.insert(name.to_string(), value);
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field.name(), json!(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field.name(), json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field.name(), json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field.name(), json!(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field.name(), json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field.name(), json!(value));
    }
}

fn render_entry(metadata: &Metadata<'_>, collected: FieldCollector) -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": SERVICE_NAME,
        "level": metadata.level().as_str(),
        "target": metadata.target(),
        "message": collected.message.unwrap_or_default(),
        "fields": collected.fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn significance_gate_drops_debug_and_trace() {
        assert!(is_significant(&Level::ERROR));
        assert!(is_significant(&Level::WARN));
        assert!(is_significant(&Level::INFO));
        assert!(!is_significant(&Level::DEBUG));
        assert!(!is_significant(&Level::TRACE));
    }

    #[test]
    fn message_field_is_lifted_out_of_the_field_map() {
        let mut collector = FieldCollector::default();
        collector.insert("message", json!("interest batch recorded"));
        collector.insert("created", json!(3));
        collector.insert("user_id", json!("0c7b..."));

        assert_eq!(
            collector.message.as_deref(),
            Some("interest batch recorded")
        );
        assert_eq!(collector.fields.get("created"), Some(&json!(3)));
        assert!(!collector.fields.contains_key("message"));
    }

    #[test]
    fn non_string_message_is_stringified() {
        let mut collector = FieldCollector::default();
        collector.insert("message", json!(42));
        assert_eq!(collector.message.as_deref(), Some("42"));
    }
}
