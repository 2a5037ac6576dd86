// src/exec/parser.rs

//! Parser for the structured result block emitted by the external executor:
//!
//! ```text
//! <openfars_result>
//! {"status": "success", "summary": "...", "artifacts": [], "metrics": {}}
//! </openfars_result>
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::backend::{AttemptStatus, StepMetrics};
use crate::errors::{OrchestratorError, Result};

static RESULT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<openfars_result>\s*(\{.*?\})\s*</openfars_result>")
        .expect("result pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResult {
    pub status: AttemptStatus,
    pub summary: String,
    /// Paths relative to the step workspace.
    pub artifacts: Vec<String>,
    pub metrics: StepMetrics,
    pub next_inputs: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct RawResult {
    status: Option<String>,
    #[serde(default)]
    summary: Option<Value>,
    #[serde(default)]
    artifacts: Vec<String>,
    #[serde(default)]
    metrics: Value,
    #[serde(default)]
    next_inputs: BTreeMap<String, Value>,
}

/// Extract and validate the first result block in `raw_output`.
pub fn parse_result_block(raw_output: &str) -> Result<ParsedResult> {
    let captures = RESULT_PATTERN.captures(raw_output).ok_or_else(|| {
        OrchestratorError::MalformedResult("missing <openfars_result> block in output".into())
    })?;

    let raw: RawResult = serde_json::from_str(&captures[1])
        .map_err(|e| OrchestratorError::MalformedResult(format!("invalid result JSON: {e}")))?;

    let status = match raw.status.as_deref() {
        Some("success") => AttemptStatus::Success,
        Some("failed") => AttemptStatus::Failed,
        other => {
            return Err(OrchestratorError::MalformedResult(format!(
                "invalid result status: {other:?}"
            )));
        }
    };

    let summary = match raw.summary {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Ok(ParsedResult {
        status,
        summary,
        artifacts: raw.artifacts,
        metrics: metrics_from(&raw.metrics),
        next_inputs: raw.next_inputs,
    })
}

/// Coerce whatever the executor reported into [`StepMetrics`]. Missing,
/// non-numeric or out-of-range values count as zero.
fn metrics_from(value: &Value) -> StepMetrics {
    let Value::Object(map) = value else {
        return StepMetrics::default();
    };
    let amount = |key: &str| map.get(key).map_or(0.0, as_amount);
    StepMetrics {
        tokens: map.get("tokens").map_or(0, as_count),
        cost_usd: amount("cost_usd"),
        token_cost_usd: amount("token_cost_usd"),
        gpu_hours: amount("gpu_hours"),
    }
}

fn as_count(value: &Value) -> u64 {
    if let Some(n) = value.as_u64() {
        return n;
    }
    let float = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match float {
        Some(f) if f.is_finite() && f > 0.0 => f.trunc() as u64,
        _ => 0,
    }
}

fn as_amount(value: &Value) -> f64 {
    let float = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    float.filter(|f| f.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_block_surrounded_by_noise() {
        let raw = r#"
noise
<openfars_result>
{"status":"success","summary":"done","artifacts":["a.txt"],"metrics":{"tokens":12},"next_inputs":{"k":"v"}}
</openfars_result>
trailing
"#;
        let parsed = parse_result_block(raw).unwrap();
        assert_eq!(parsed.status, AttemptStatus::Success);
        assert_eq!(parsed.summary, "done");
        assert_eq!(parsed.artifacts, vec!["a.txt"]);
        assert_eq!(parsed.metrics.tokens, 12);
        assert_eq!(parsed.metrics.cost_usd, 0.0);
        assert_eq!(parsed.next_inputs["k"], "v");
    }

    #[test]
    fn missing_block_is_malformed() {
        let err = parse_result_block("no result").unwrap_err();
        match err {
            OrchestratorError::MalformedResult(msg) => assert!(msg.contains("missing")),
            other => panic!("expected MalformedResult, got {other:?}"),
        }
    }

    #[test]
    fn unknown_status_is_malformed() {
        let raw = "<openfars_result>{\"status\":\"maybe\"}</openfars_result>";
        assert!(matches!(
            parse_result_block(raw),
            Err(OrchestratorError::MalformedResult(_))
        ));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let raw = "<openfars_result>{\"status\": }</openfars_result>";
        assert!(matches!(
            parse_result_block(raw),
            Err(OrchestratorError::MalformedResult(_))
        ));
    }

    #[test]
    fn loosely_typed_metrics_are_coerced() {
        let raw = r#"<openfars_result>
{"status":"success","metrics":{"tokens":1500.0,"cost_usd":"0.25","token_cost_usd":null,"gpu_hours":"lots"}}
</openfars_result>"#;
        let parsed = parse_result_block(raw).unwrap();
        assert_eq!(parsed.status, AttemptStatus::Success);
        assert_eq!(parsed.metrics.tokens, 1500);
        assert_eq!(parsed.metrics.cost_usd, 0.25);
        assert_eq!(parsed.metrics.token_cost_usd, 0.0);
        assert_eq!(parsed.metrics.gpu_hours, 0.0);
    }

    #[test]
    fn invalid_token_counts_fall_back_to_zero() {
        for tokens in ["-5", r#""many""#, "[1]", r#""12""#] {
            let raw = format!(
                "<openfars_result>{{\"status\":\"success\",\"metrics\":{{\"tokens\":{tokens}}}}}</openfars_result>"
            );
            let parsed = parse_result_block(&raw).unwrap();
            let expected = if tokens == r#""12""# { 12 } else { 0 };
            assert_eq!(parsed.metrics.tokens, expected, "{tokens}");
        }

        let raw = "<openfars_result>{\"status\":\"success\",\"metrics\":\"n/a\"}</openfars_result>";
        assert_eq!(parse_result_block(raw).unwrap().metrics, StepMetrics::default());
    }

    #[test]
    fn failed_status_is_parsed() {
        let raw = "<openfars_result>{\"status\":\"failed\",\"summary\":\"nope\"}</openfars_result>";
        let parsed = parse_result_block(raw).unwrap();
        assert_eq!(parsed.status, AttemptStatus::Failed);
        assert!(parsed.artifacts.is_empty());
    }
}
