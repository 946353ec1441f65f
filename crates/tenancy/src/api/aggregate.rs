//! Aggregate argument parsing.
//!
//! `aggregate` accepts several call shapes:
//!
//! | Arguments | Pipeline | Callback |
//! |-----------|----------|----------|
//! | none | `[]` | none |
//! | `a` | `[a]` | none |
//! | `a, cb` | `[a]` | `cb` |
//! | `a, b` | `[a, b]` | none |
//! | `a, b, cb` | `[a, b]` | `cb` |
//! | `[a, b]` | `[a, b]` | none |
//! | `[a, b], cb` | `[a, b]` | `cb` |

use std::fmt;

use serde_json::Value;

use crate::error::{TenancyError, ValidationError};
use crate::model::Callback;
use crate::store::Document;

/// One argument of an `aggregate` call.
pub enum AggregateArg {
    /// A single pipeline stage.
    Stage(Value),
    /// A whole pipeline.
    Pipeline(Vec<Value>),
    /// The completion callback.
    Callback(Callback<Vec<Document>>),
}

impl AggregateArg {
    /// Wraps a closure as the completion callback.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Result<&Vec<Document>, &TenancyError>) + Send + 'static,
    {
        AggregateArg::Callback(Box::new(f))
    }
}

impl From<Value> for AggregateArg {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(stages) => AggregateArg::Pipeline(stages),
            stage => AggregateArg::Stage(stage),
        }
    }
}

impl fmt::Debug for AggregateArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateArg::Stage(stage) => f.debug_tuple("Stage").field(stage).finish(),
            AggregateArg::Pipeline(stages) => f.debug_tuple("Pipeline").field(stages).finish(),
            AggregateArg::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// A parsed `aggregate` call.
pub struct ParsedAggregate {
    /// Pipeline stages in order.
    pub pipeline: Vec<Value>,
    /// The trailing callback, if one was supplied.
    pub callback: Option<Callback<Vec<Document>>>,
}

impl fmt::Debug for ParsedAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedAggregate")
            .field("pipeline", &self.pipeline)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Splits `aggregate` arguments into a pipeline and an optional callback.
///
/// A callback anywhere but last is rejected.
pub fn parse_aggregate_arguments(
    mut args: Vec<AggregateArg>,
) -> Result<ParsedAggregate, ValidationError> {
    let callback = if matches!(args.last(), Some(AggregateArg::Callback(_))) {
        match args.pop() {
            Some(AggregateArg::Callback(callback)) => Some(callback),
            _ => None,
        }
    } else {
        None
    };

    if matches!(args.as_slice(), [AggregateArg::Pipeline(_)]) {
        if let Some(AggregateArg::Pipeline(pipeline)) = args.pop() {
            return Ok(ParsedAggregate { pipeline, callback });
        }
    }

    let mut pipeline = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            AggregateArg::Stage(stage) => pipeline.push(stage),
            AggregateArg::Pipeline(stages) => pipeline.push(Value::Array(stages)),
            AggregateArg::Callback(_) => {
                return Err(ValidationError::InvalidArguments {
                    operation: "aggregate".to_string(),
                    message: "the callback must be the last argument".to_string(),
                });
            }
        }
    }
    Ok(ParsedAggregate { pipeline, callback })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn a() -> Value {
        json!({"$match": {"a": 1}})
    }

    fn b() -> Value {
        json!({"$sort": {"b": 1}})
    }

    fn cb() -> AggregateArg {
        AggregateArg::callback(|_| {})
    }

    fn parse(args: Vec<AggregateArg>) -> ParsedAggregate {
        parse_aggregate_arguments(args).unwrap()
    }

    #[test]
    fn test_no_arguments() {
        let parsed = parse(vec![]);
        assert!(parsed.pipeline.is_empty());
        assert!(parsed.callback.is_none());
    }

    #[test]
    fn test_single_stage() {
        let parsed = parse(vec![a().into()]);
        assert_eq!(parsed.pipeline, vec![a()]);
        assert!(parsed.callback.is_none());
    }

    #[test]
    fn test_single_stage_with_callback() {
        let parsed = parse(vec![a().into(), cb()]);
        assert_eq!(parsed.pipeline, vec![a()]);
        assert!(parsed.callback.is_some());
    }

    #[test]
    fn test_stages() {
        let parsed = parse(vec![a().into(), b().into()]);
        assert_eq!(parsed.pipeline, vec![a(), b()]);
        assert!(parsed.callback.is_none());
    }

    #[test]
    fn test_stages_with_callback() {
        let parsed = parse(vec![a().into(), b().into(), cb()]);
        assert_eq!(parsed.pipeline, vec![a(), b()]);
        assert!(parsed.callback.is_some());
    }

    #[test]
    fn test_pipeline() {
        let parsed = parse(vec![json!([a(), b()]).into()]);
        assert_eq!(parsed.pipeline, vec![a(), b()]);
        assert!(parsed.callback.is_none());
    }

    #[test]
    fn test_pipeline_with_callback() {
        let parsed = parse(vec![AggregateArg::Pipeline(vec![a(), b()]), cb()]);
        assert_eq!(parsed.pipeline, vec![a(), b()]);
        assert!(parsed.callback.is_some());
    }

    #[test]
    fn test_callback_must_be_last() {
        let err = parse_aggregate_arguments(vec![cb(), a().into()]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidArguments { .. }));
    }
}
