use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A remote-job problem family (§3, §4.5). Display names and the model
/// table are supplemented from `original_source/.../rshub_components.py`'s
/// `SCENARIO_TYPES`/`MODEL_NAMES`, which spec.md's prose drops but which a
/// complete implementation needs to label a `project_name` meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Snow,
    Soil,
    Vegetation,
}

impl Scenario {
    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::Snow => "snow",
            Scenario::Soil => "soil",
            Scenario::Vegetation => "vegetation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "snow" => Some(Scenario::Snow),
            "soil" => Some(Scenario::Soil),
            "vegetation" | "veg" => Some(Scenario::Vegetation),
            _ => None,
        }
    }

    /// The candidate models for this scenario, in selection-priority order
    /// (snow's default is the first entry, `qms`).
    pub fn models(self) -> &'static [&'static str] {
        match self {
            Scenario::Snow => &["qms", "bic"],
            Scenario::Soil => &["aiem"],
            Scenario::Vegetation => &["rt"],
        }
    }

    pub fn default_model(self) -> &'static str {
        self.models()[0]
    }

    pub fn model_display_name(model: &str) -> &'static str {
        match model {
            "qms" => "DMRT-QMS",
            "bic" => "DMRT-BIC",
            "aiem" => "AIEM",
            "rt" => "VPRT",
            _ => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationMode {
    Active,
    Passive,
}

impl ObservationMode {
    /// `"bs"` for active (backscatter), `"tb"` for passive (brightness
    /// temperature). Soil tasks combine both modes in one task and default
    /// to `"bs"` (§4.5.1 step 6).
    pub fn output_var(self) -> &'static str {
        match self {
            ObservationMode::Active => "bs",
            ObservationMode::Passive => "tb",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObservationMode::Active => "active",
            ObservationMode::Passive => "passive",
        }
    }
}

/// One task within a remote-job run (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTask {
    pub name: String,
    pub output_var: String,
}

/// A submitted (or about-to-be-submitted) remote-job run (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteJobRun {
    pub scenario: Scenario,
    pub model: String,
    pub modes: Vec<ObservationMode>,
    pub project_name: String,
    pub tasks: Vec<JobTask>,
    pub data_dicts: Vec<Map<String, Value>>,
}

impl RemoteJobRun {
    /// `{scenario}-{model}-{timestamp_ms}` (§4.5.1 step 3).
    pub fn project_name(scenario: Scenario, model: &str, timestamp_ms: i64) -> String {
        format!("{}-{}-{}", scenario.as_str(), model, timestamp_ms)
    }

    /// `{scenario}-{model}-{mode}-[index-]{timestamp}` (§4.5.1 step 6).
    /// Soil tasks omit the mode segment (they combine active+passive).
    pub fn task_name(
        scenario: Scenario,
        model: &str,
        mode: Option<ObservationMode>,
        index: Option<usize>,
        timestamp_ms: i64,
    ) -> String {
        let mut parts = vec![scenario.as_str().to_string(), model.to_string()];
        if let Some(m) = mode {
            parts.push(m.as_str().to_string());
        }
        if let Some(i) = index {
            parts.push((i + 1).to_string());
        }
        parts.push(timestamp_ms.to_string());
        parts.join("-")
    }

    pub fn validate_invariants(&self) -> Result<(), String> {
        if self.tasks.len() != self.data_dicts.len() {
            return Err(format!(
                "tasks/data_dicts length mismatch: {} vs {}",
                self.tasks.len(),
                self.data_dicts.len()
            ));
        }
        for dict in &self.data_dicts {
            for key in REQUIRED_SYSTEM_FIELDS {
                if !dict.contains_key(*key) {
                    return Err(format!("data dict missing required field {key}"));
                }
            }
        }
        Ok(())
    }
}

/// Required system fields every data dict must carry once system-field
/// injection has run (§4.5.1 step 6, §8 property 8). `output_var` and
/// `force_update_flag`/`core_num`/`algorithm` round out the full set; this
/// constant lists the subset §8 names explicitly as an invariant.
pub const REQUIRED_SYSTEM_FIELDS: &[&str] = &[
    "token",
    "project_name",
    "task_name",
    "scenario_flag",
    "algorithm",
    "level_required",
    "output_var",
];

/// Inject the system fields into a user/LLM-authored data dict (§4.5.1
/// step 6). Does not overwrite scenario parameters already present.
pub fn inject_system_fields(
    dict: &mut Map<String, Value>,
    token: &str,
    project_name: &str,
    task_name: &str,
    scenario: Scenario,
    algorithm: &str,
    output_var: &str,
    force_update_flag: bool,
    core_num: u32,
) {
    dict.insert("token".into(), Value::String(token.to_string()));
    dict.insert("project_name".into(), Value::String(project_name.to_string()));
    dict.insert("task_name".into(), Value::String(task_name.to_string()));
    dict.insert("scenario_flag".into(), Value::String(scenario.as_str().to_string()));
    dict.insert("algorithm".into(), Value::String(algorithm.to_string()));
    dict.insert("level_required".into(), Value::from(1));
    dict.insert("force_update_flag".into(), Value::Bool(force_update_flag));
    dict.insert("core_num".into(), Value::from(core_num));
    dict.insert("output_var".into(), Value::String(output_var.to_string()));
}

/// The literal success marker the remote-job submit endpoint returns
/// (§6 Outbound remote-job, §4.5.1 step 7).
pub const SUBMIT_SUCCESS_MARKER: &str = "Job submitted!";

/// Literal substrings used to classify a poll response (§4.5.2 step 2).
pub const POLL_COMPLETED_MARKER: &str = "Jobs are completed";
pub const POLL_FAILED_MARKER: &str = "Jobs are failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed,
    StillRunning,
}

pub fn classify_poll_response(text: &str) -> PollOutcome {
    if text.contains(POLL_COMPLETED_MARKER) {
        PollOutcome::Completed
    } else if text.contains(POLL_FAILED_MARKER) {
        PollOutcome::Failed
    } else {
        PollOutcome::StillRunning
    }
}

/// The structured task descriptor embedded as a fenced JSON block in a
/// submission response (§4.5.1 step 9) and later scanned for by the
/// retrieval workflow (§4.5.2 step 1). Field names match the required
/// schema spec.md names verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub project_name: String,
    pub scenario_info: String,
    pub model_name: String,
    pub observation_modes: Vec<String>,
    pub tasks: Vec<JobTask>,
    pub data_dicts: Vec<Map<String, Value>>,
}

impl TaskDescriptor {
    pub const REQUIRED_FIELDS: [&'static str; 6] = [
        "project_name",
        "scenario_info",
        "model_name",
        "observation_modes",
        "tasks",
        "data_dicts",
    ];

    /// Fence marker the orchestrator writes and the extractor scans for.
    pub const FENCE_MARKER: &'static str = "**Task details**";

    pub fn to_fenced_block(&self) -> String {
        let json = serde_json::to_string_pretty(self).unwrap_or_default();
        format!("{}\n```json\n{}\n```", Self::FENCE_MARKER, json)
    }
}

/// Per-scenario required physical-parameter keys and their inclusive valid
/// range, checked after shape extraction (§4.5 "validation against a
/// per-scenario schema check: required keys present, numeric ranges").
/// Key names and bounds aren't pinned by spec.md's prose — they're derived
/// from the parameter-generation prompt's own scenario documentation (see
/// `scenario_doc`); see DESIGN.md for this decision.
fn scenario_schema(scenario: Scenario) -> &'static [(&'static str, f64, f64)] {
    match scenario {
        Scenario::Snow => &[
            ("fGHz", 0.1, 100.0),
            ("depth", 0.0, 1000.0),
            ("density", 0.0, 1.0),
            ("grain_size", 0.0, 10.0),
            ("sm", 0.0, 1.0),
        ],
        Scenario::Soil => &[
            ("fGHz", 0.1, 100.0),
            ("incidence_angle", 0.0, 90.0),
            ("rms_height", 0.0, 50.0),
            ("corr_length", 0.0, 100.0),
            ("sm", 0.0, 1.0),
        ],
        Scenario::Vegetation => &[
            ("fGHz", 0.1, 100.0),
            ("vwc", 0.0, 10.0),
            ("canopy_height", 0.0, 50.0),
            ("sm", 0.0, 1.0),
        ],
    }
}

fn validate_scenario_schema(dict: &Map<String, Value>, scenario: Scenario) -> Result<(), String> {
    for (key, min, max) in scenario_schema(scenario) {
        let value = dict
            .get(*key)
            .ok_or_else(|| format!("missing required {} parameter `{key}`", scenario.as_str()))?;
        let number = value
            .as_f64()
            .ok_or_else(|| format!("parameter `{key}` must be numeric"))?;
        if number < *min || number > *max {
            return Err(format!("parameter `{key}` = {number} is outside the allowed range [{min}, {max}]"));
        }
    }
    Ok(())
}

/// Parameter DSL validation (§9: the Rust reimplementation's replacement
/// for evaluating LLM-emitted code). The LLM emits one of two JSON shapes:
///
/// - `{"data_dicts": [{...}, {...}]}` — preferred, flat dicts.
/// - `{"tasks": [{"data": {...}}, {"params": {...}}]}` — legacy nested
///   shape, auto-flattened.
///
/// Each extracted dict is then checked against `scenario`'s required-key/
/// range schema. Returns the extracted flat data dicts, or a validation
/// error describing what's wrong (shape or schema) — used to drive the
/// LLM-guided retry loop, §4.5.1 step 8.
pub fn extract_data_dicts(generated: &Value, scenario: Scenario) -> Result<Vec<Map<String, Value>>, String> {
    let dicts = extract_shape(generated)?;
    for (i, dict) in dicts.iter().enumerate() {
        validate_scenario_schema(dict, scenario).map_err(|e| format!("task {}: {e}", i + 1))?;
    }
    Ok(dicts)
}

fn extract_shape(generated: &Value) -> Result<Vec<Map<String, Value>>, String> {
    if let Some(dicts) = generated.get("data_dicts").and_then(|v| v.as_array()) {
        return dicts
            .iter()
            .map(|v| {
                v.as_object()
                    .cloned()
                    .ok_or_else(|| "data_dicts entries must be objects".to_string())
            })
            .collect();
    }

    if let Some(tasks) = generated.get("tasks").and_then(|v| v.as_array()) {
        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            let obj = task
                .as_object()
                .ok_or_else(|| "tasks entries must be objects".to_string())?;
            let nested = obj
                .get("data")
                .or_else(|| obj.get("params"))
                .and_then(|v| v.as_object())
                .cloned()
                .ok_or_else(|| "task entry missing data/params object".to_string())?;
            out.push(flatten_legacy_nesting(nested));
        }
        if out.is_empty() {
            return Err("no tasks produced any data dicts".to_string());
        }
        return Ok(out);
    }

    // Fall back: any top-level object whose keys look like a single flat
    // data dict (named "data", "data1", "data2", ...).
    if let Some(obj) = generated.as_object() {
        let mut found = Vec::new();
        let mut idx = 0usize;
        loop {
            let key = if idx == 0 { "data".to_string() } else { format!("data{idx}") };
            match obj.get(&key).and_then(|v| v.as_object()) {
                Some(dict) => {
                    found.push(flatten_legacy_nesting(dict.clone()));
                    idx += 1;
                }
                None => break,
            }
        }
        if !found.is_empty() {
            return Ok(found);
        }
    }

    Err("no data dicts found: expected \"data_dicts\", \"tasks\", or named \"data\"/\"data1\"/... keys".to_string())
}

/// Auto-flatten a legacy `{params: {...}}` wrapper into a top-level dict
/// (§4.5.1 step 4: "the system auto-flattens legacy nested shapes").
fn flatten_legacy_nesting(mut dict: Map<String, Value>) -> Map<String, Value> {
    if let Some(Value::Object(inner)) = dict.remove("params") {
        for (k, v) in inner {
            dict.insert(k, v);
        }
    }
    dict
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn project_and_task_name_formats() {
        let pn = RemoteJobRun::project_name(Scenario::Snow, "qms", 1_700_000_000_000);
        assert_eq!(pn, "snow-qms-1700000000000");

        let tn = RemoteJobRun::task_name(Scenario::Snow, "qms", Some(ObservationMode::Active), None, 1_700_000_000_000);
        assert_eq!(tn, "snow-qms-active-1700000000000");

        let tn_indexed =
            RemoteJobRun::task_name(Scenario::Soil, "aiem", None, Some(1), 1_700_000_000_000);
        assert_eq!(tn_indexed, "soil-aiem-2-1700000000000");
    }

    #[test]
    fn output_var_by_mode() {
        assert_eq!(ObservationMode::Active.output_var(), "bs");
        assert_eq!(ObservationMode::Passive.output_var(), "tb");
    }

    #[test]
    fn invariant_fails_on_mismatched_lengths() {
        let run = RemoteJobRun {
            scenario: Scenario::Soil,
            model: "aiem".into(),
            modes: vec![ObservationMode::Active],
            project_name: "soil-aiem-1".into(),
            tasks: vec![JobTask { name: "t1".into(), output_var: "bs".into() }],
            data_dicts: vec![],
        };
        assert!(run.validate_invariants().is_err());
    }

    #[test]
    fn extract_from_preferred_shape() {
        let generated = json!({"data_dicts": [
            {"fGHz": 10.0, "vwc": 2.0, "canopy_height": 5.0, "sm": 0.3},
            {"fGHz": 12.0, "vwc": 2.5, "canopy_height": 6.0, "sm": 0.25},
        ]});
        let dicts = extract_data_dicts(&generated, Scenario::Vegetation).unwrap();
        assert_eq!(dicts.len(), 2);
    }

    #[test]
    fn extract_from_legacy_tasks_shape_flattens_params() {
        let generated = json!({"tasks": [{"params": {"fGHz": 10.0, "vwc": 2.0, "canopy_height": 5.0, "sm": 0.2}}]});
        let dicts = extract_data_dicts(&generated, Scenario::Vegetation).unwrap();
        assert_eq!(dicts.len(), 1);
        assert_eq!(dicts[0]["fGHz"], 10.0);
        assert_eq!(dicts[0]["sm"], 0.2);
    }

    #[test]
    fn extract_from_named_data_keys() {
        let generated = json!({
            "data": {"fGHz": 10.0, "vwc": 2.0, "canopy_height": 5.0, "sm": 0.2},
            "data1": {"fGHz": 12.0, "vwc": 2.2, "canopy_height": 5.5, "sm": 0.22},
        });
        let dicts = extract_data_dicts(&generated, Scenario::Vegetation).unwrap();
        assert_eq!(dicts.len(), 2);
    }

    #[test]
    fn extract_fails_with_descriptive_error() {
        let generated = json!({"unrelated": true});
        let err = extract_data_dicts(&generated, Scenario::Vegetation).unwrap_err();
        assert!(err.contains("no data dicts found"));
    }

    #[test]
    fn extract_fails_on_missing_scenario_parameter() {
        let generated = json!({"data_dicts": [{"fGHz": 10.0}]});
        let err = extract_data_dicts(&generated, Scenario::Vegetation).unwrap_err();
        assert!(err.contains("vwc"));
    }

    #[test]
    fn extract_fails_on_out_of_range_parameter() {
        let generated = json!({"data_dicts": [
            {"fGHz": 10.0, "vwc": 2.0, "canopy_height": 5.0, "sm": 1.5},
        ]});
        let err = extract_data_dicts(&generated, Scenario::Vegetation).unwrap_err();
        assert!(err.contains("sm"));
    }

    #[test]
    fn poll_response_classification() {
        assert_eq!(classify_poll_response("Jobs are completed successfully"), PollOutcome::Completed);
        assert_eq!(classify_poll_response("Jobs are failed: timeout"), PollOutcome::Failed);
        assert_eq!(classify_poll_response("still working"), PollOutcome::StillRunning);
    }
}
