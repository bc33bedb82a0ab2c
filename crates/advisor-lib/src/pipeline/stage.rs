//! Typed pipeline stages
//!
//! A stage document is a JSON object with exactly one operator key
//! (`{"$group": {...}}`). Parsing resolves the operator to a closed
//! [`StageKind`] and records the shape attributes the classifier needs;
//! operators outside the known set become [`StageKind::Unknown`] with the raw
//! payload preserved.

use crate::error::AdvisorError;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Known stage kinds, plus an explicit unknown variant
#[derive(Debug, Clone, PartialEq)]
pub enum StageKind {
    Source,
    Match,
    Project,
    AddFields,
    Group,
    Window,
    Function,
    Lookup,
    /// Sink stage (`$merge` or `$emit`)
    Merge,
    Sort,
    Facet,
    Unknown { operator: String, payload: Value },
}

impl StageKind {
    /// Resolve an operator name, keeping the payload for unknown operators
    pub fn from_operator(operator: &str, payload: &Value) -> StageKind {
        match operator {
            "$source" => StageKind::Source,
            "$match" => StageKind::Match,
            "$project" | "$unset" => StageKind::Project,
            "$addFields" | "$set" => StageKind::AddFields,
            "$group" => StageKind::Group,
            "$tumblingWindow" | "$hoppingWindow" | "$sessionWindow" | "$window" => {
                StageKind::Window
            }
            "$function" | "$externalFunction" => StageKind::Function,
            "$lookup" => StageKind::Lookup,
            "$merge" | "$emit" => StageKind::Merge,
            "$sort" => StageKind::Sort,
            "$facet" => StageKind::Facet,
            other => StageKind::Unknown {
                operator: other.to_string(),
                payload: payload.clone(),
            },
        }
    }

    /// Factor name used in scores and rationale
    pub fn factor_name(&self) -> String {
        match self {
            StageKind::Source => "source".into(),
            StageKind::Match => "match".into(),
            StageKind::Project => "project".into(),
            StageKind::AddFields => "addFields".into(),
            StageKind::Group => "group".into(),
            StageKind::Window => "window".into(),
            StageKind::Function => "function".into(),
            StageKind::Lookup => "lookup".into(),
            StageKind::Merge => "merge".into(),
            StageKind::Sort => "sort".into(),
            StageKind::Facet => "facet".into(),
            StageKind::Unknown { operator, .. } => format!("unknown:{}", operator),
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, StageKind::Source)
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, StageKind::Merge)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, StageKind::Unknown { .. })
    }
}

/// One parsed stage; immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStage {
    pub operator: String,
    pub kind: StageKind,
    /// Total number of keys in the stage body, excluding embedded pipelines
    pub field_count: usize,
    /// Maximum object/array nesting inside the body; scalars only = 0
    pub depth: usize,
    /// Pipelines embedded by `$lookup`, window stages and `$facet`
    pub sub_pipelines: Vec<Vec<PipelineStage>>,
    pub parallelism: Option<u32>,
    pub connections: BTreeSet<String>,
    /// Any key or value of the stage document names Kafka
    pub mentions_kafka: bool,
}

impl PipelineStage {
    /// Parse a stage document. `position` is used in error messages only.
    pub fn from_document(doc: &Value, position: &str) -> Result<PipelineStage, AdvisorError> {
        let object = doc.as_object().ok_or_else(|| {
            AdvisorError::invalid_pipeline(
                format!("{} is not a stage document", position),
                "each pipeline entry must be an object such as {\"$match\": {...}}",
            )
        })?;

        let mut operators = object.keys().filter(|k| k.starts_with('$'));
        let operator = match (operators.next(), operators.next()) {
            (Some(op), None) => op.clone(),
            (None, _) => {
                return Err(AdvisorError::invalid_pipeline(
                    format!("{} has no stage operator", position),
                    "name the stage with a single operator key such as $source or $match",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(AdvisorError::invalid_pipeline(
                    format!("{} declares more than one stage operator", position),
                    "split the document into one stage per operator",
                ))
            }
        };

        let body = &object[&operator];
        let kind = StageKind::from_operator(&operator, body);
        let embedded = embedded_pipeline_keys(&kind, body);

        let sub_pipelines = parse_sub_pipelines(&kind, body, &embedded, position)?;

        let (field_count, depth) = match body {
            Value::Object(map) => shape_of_object(map, &embedded),
            Value::Array(items) => items.iter().fold((0, 1), |(fields, depth), item| {
                let (f, d) = shape_of(item);
                (fields + f, depth.max(d + 1))
            }),
            _ => (0, 0),
        };

        let parallelism = declared_parallelism(object, body);

        let mut connections = BTreeSet::new();
        collect_connections(body, &embedded, &mut connections);

        let mentions_kafka = doc.to_string().to_ascii_lowercase().contains("kafka");

        Ok(PipelineStage {
            operator,
            kind,
            field_count,
            depth,
            sub_pipelines,
            parallelism,
            connections,
            mentions_kafka,
        })
    }

    /// This stage followed by every embedded stage, depth first
    pub fn walk(&self) -> Vec<&PipelineStage> {
        let mut out = vec![self];
        for sub in &self.sub_pipelines {
            for stage in sub {
                out.extend(stage.walk());
            }
        }
        out
    }
}

/// Keys of the body that hold embedded pipelines
fn embedded_pipeline_keys(kind: &StageKind, body: &Value) -> Vec<String> {
    match (kind, body) {
        (StageKind::Lookup | StageKind::Window, Value::Object(map)) if map.contains_key("pipeline") => {
            vec!["pipeline".to_string()]
        }
        (StageKind::Facet, Value::Object(map)) => map
            .iter()
            .filter(|(_, v)| v.is_array())
            .map(|(k, _)| k.clone())
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_sub_pipelines(
    kind: &StageKind,
    body: &Value,
    keys: &[String],
    position: &str,
) -> Result<Vec<Vec<PipelineStage>>, AdvisorError> {
    let mut pipelines = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(items) = body.get(key).and_then(Value::as_array) else {
            return Err(AdvisorError::invalid_pipeline(
                format!("{} has a non-array '{}'", position, key),
                format!("the '{}' of a {} stage must be an array of stages", key, kind.factor_name()),
            ));
        };
        let stages = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                PipelineStage::from_document(item, &format!("{} {}[{}]", position, key, i))
            })
            .collect::<Result<Vec<_>, _>>()?;
        pipelines.push(stages);
    }
    Ok(pipelines)
}

fn shape_of_object(map: &Map<String, Value>, skip: &[String]) -> (usize, usize) {
    map.iter()
        .filter(|(k, _)| !skip.contains(k))
        .fold((0, 0), |(fields, depth), (_, v)| {
            let (f, d) = shape_of(v);
            (fields + 1 + f, depth.max(d))
        })
}

/// (field count, nesting depth) of a value
fn shape_of(value: &Value) -> (usize, usize) {
    match value {
        Value::Object(map) => {
            let (fields, depth) = shape_of_object(map, &[]);
            (fields, depth + 1)
        }
        Value::Array(items) => items.iter().fold((0, 1), |(fields, depth), item| {
            let (f, d) = shape_of(item);
            (fields + f, depth.max(d + 1))
        }),
        _ => (0, 0),
    }
}

fn declared_parallelism(doc: &Map<String, Value>, body: &Value) -> Option<u32> {
    doc.get("parallelism")
        .or_else(|| body.get("parallelism"))
        .and_then(Value::as_f64)
        .filter(|p| *p >= 1.0)
        .map(|p| p as u32)
}

fn collect_connections(value: &Value, skip: &[String], out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter().filter(|(k, _)| !skip.contains(k)) {
                match (key.as_str(), v) {
                    ("connectionName", Value::String(name)) => {
                        out.insert(name.clone());
                    }
                    _ => collect_connections(v, &[], out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_connections(v, &[], out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(doc: Value) -> PipelineStage {
        PipelineStage::from_document(&doc, "stage 1").unwrap()
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!(parse(json!({"$set": {"a": 1}})).kind, StageKind::AddFields);
        assert_eq!(parse(json!({"$unset": "a"})).kind, StageKind::Project);
        assert_eq!(parse(json!({"$emit": {"connectionName": "k"}})).kind, StageKind::Merge);
        assert_eq!(
            parse(json!({"$hoppingWindow": {"pipeline": []}})).kind,
            StageKind::Window
        );
        assert_eq!(parse(json!({"$externalFunction": {}})).kind, StageKind::Function);
    }

    #[test]
    fn test_unknown_operator_keeps_payload() {
        let stage = parse(json!({"$validate": {"validator": {"a": 1}}}));
        match &stage.kind {
            StageKind::Unknown { operator, payload } => {
                assert_eq!(operator, "$validate");
                assert_eq!(payload, &json!({"validator": {"a": 1}}));
            }
            other => panic!("expected unknown kind, got {:?}", other),
        }
        assert_eq!(stage.kind.factor_name(), "unknown:$validate");
    }

    #[test]
    fn test_shape_of_flat_body() {
        let stage = parse(json!({"$source": {"connectionName": "kafka", "topic": "events"}}));
        assert_eq!(stage.field_count, 2);
        assert_eq!(stage.depth, 0);
        assert!(stage.connections.contains("kafka"));
    }

    #[test]
    fn test_shape_of_nested_body() {
        let stage = parse(json!({
            "$group": {
                "_id": "$device",
                "total": {"$sum": "$value"},
                "stats": {"avg": {"$avg": "$value"}}
            }
        }));
        // _id, total, $sum, stats, avg, $avg
        assert_eq!(stage.field_count, 6);
        assert_eq!(stage.depth, 2);
    }

    #[test]
    fn test_scalar_body_has_no_shape() {
        let stage = parse(json!({"$unset": "secret"}));
        assert_eq!(stage.field_count, 0);
        assert_eq!(stage.depth, 0);
    }

    #[test]
    fn test_lookup_sub_pipeline_excluded_from_shape() {
        let stage = parse(json!({
            "$lookup": {
                "from": {"connectionName": "cluster", "db": "d", "coll": "c"},
                "as": "joined",
                "pipeline": [{"$match": {"x": 1}}, {"$project": {"y": 1}}]
            }
        }));
        assert_eq!(stage.sub_pipelines.len(), 1);
        assert_eq!(stage.sub_pipelines[0].len(), 2);
        // from, connectionName, db, coll, as
        assert_eq!(stage.field_count, 5);
        assert_eq!(stage.depth, 1);
        assert_eq!(stage.walk().len(), 3);
        assert!(stage.connections.contains("cluster"));
    }

    #[test]
    fn test_facet_branches_are_sub_pipelines() {
        let stage = parse(json!({
            "$facet": {
                "a": [{"$match": {"x": 1}}],
                "b": [{"$group": {"_id": null}}]
            }
        }));
        assert_eq!(stage.sub_pipelines.len(), 2);
        assert_eq!(stage.field_count, 0);
    }

    #[test]
    fn test_parallelism_inside_body_or_document() {
        let inner = parse(json!({"$merge": {"into": {"connectionName": "c"}, "parallelism": 4}}));
        assert_eq!(inner.parallelism, Some(4));
        let outer = parse(json!({"$merge": {"into": {}}, "parallelism": 2}));
        assert_eq!(outer.parallelism, Some(2));
        assert_eq!(parse(json!({"$match": {}})).parallelism, None);
    }

    #[test]
    fn test_parallelism_beyond_u32_is_clamped() {
        let stage = parse(json!({"$merge": {"into": {}}, "parallelism": 1e12}));
        assert_eq!(stage.parallelism, Some(u32::MAX));
    }

    #[test]
    fn test_kafka_mention_anywhere_in_document() {
        assert!(parse(json!({"$source": {"connectionName": "kafka", "topic": "t"}})).mentions_kafka);
        assert!(parse(json!({"$emit": {"connectionName": "prod", "config": {"type": "Kafka"}}})).mentions_kafka);
        assert!(!parse(json!({"$source": {"connectionName": "sample_stream_solar"}})).mentions_kafka);
    }

    #[test]
    fn test_malformed_documents_rejected() {
        let not_object = PipelineStage::from_document(&json!("$match"), "stage 2");
        assert!(matches!(not_object, Err(AdvisorError::InvalidPipeline { .. })));

        let no_operator = PipelineStage::from_document(&json!({"match": {}}), "stage 2");
        assert!(no_operator.is_err());

        let two_operators =
            PipelineStage::from_document(&json!({"$match": {}, "$project": {}}), "stage 2");
        assert!(two_operators.is_err());

        let bad_sub = PipelineStage::from_document(&json!({"$lookup": {"pipeline": {}}}), "stage 2");
        assert!(bad_sub.is_err());
    }
}
