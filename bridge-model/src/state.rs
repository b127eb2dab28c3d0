//! Derived, formatted states pushed to an external sink.

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::config::StateConfig;
use crate::dataref::{Dataref, DatarefListener, DatarefRegistry};
use crate::rpn;
use crate::sink::TpSink;

/// Extract the ordered list of `{$path$}` placeholders from a formula.
fn extract_dataref_paths(formula: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut rest = formula;
    while let Some(start) = rest.find("{$") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("$}") else { break };
        paths.push(after[..end].to_string());
        rest = &after[end + 2..];
    }
    paths
}

/// A single named derived value: a formula over dataref placeholders,
/// formatted according to its declared data type and pushed to the sink
/// only when the formatted result actually changes.
pub struct TPState {
    display_name: String,
    internal_name: String,
    formula: String,
    datatype: String,
    dataref_paths: Vec<String>,
    previous_value: Mutex<Option<String>>,
    registry: Arc<DatarefRegistry>,
    sink: Arc<dyn TpSink>,
}

impl TPState {
    /// Construct a state, registering it with the sink and attaching it as a
    /// listener to every dataref its formula references.
    pub fn new(
        plugin_id: &str,
        config: &StateConfig,
        registry: Arc<DatarefRegistry>,
        sink: Arc<dyn TpSink>,
    ) -> Arc<Self> {
        let internal_name = config
            .internal_name
            .clone()
            .unwrap_or_else(|| crate::config::mkintname(plugin_id, &config.name));

        sink.create_state(&internal_name, &config.name, "None");

        let dataref_paths = extract_dataref_paths(&config.formula);

        let state = Arc::new(Self {
            display_name: config.name.clone(),
            internal_name,
            formula: config.formula.clone(),
            datatype: config.datatype.clone(),
            dataref_paths: dataref_paths.clone(),
            previous_value: Mutex::new(None),
            registry: Arc::clone(&registry),
            sink,
        });

        for path in &dataref_paths {
            let dref = registry.get(path);
            dref.set_rounding(config.dataref_rounding);
            let listener: Arc<dyn DatarefListener> = state.clone() as Arc<dyn DatarefListener>;
            dref.add_listener(&listener);
        }

        state
    }

    pub fn internal_name(&self) -> &str {
        &self.internal_name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn dataref_paths(&self) -> &[String] {
        &self.dataref_paths
    }

    /// Recompute the formatted value: substitute dataref values into the
    /// formula, evaluate via the RPN engine, then format per `datatype`.
    pub fn value(&self) -> String {
        let mut expr = self.formula.clone();
        for path in &self.dataref_paths {
            let value = self.registry.value(path, None);
            let text = value.map_or_else(|| "0.0".to_string(), |v| v.to_string());
            expr = expr.replace(&format!("{{${path}$}}"), &text);
        }

        let evaluated = match rpn::evaluate(&expr) {
            Ok(v) => v,
            Err(err) => {
                warn!("state {}: formula evaluation failed: {err}", self.internal_name);
                return String::new();
            }
        };

        format_value(&self.datatype, evaluated)
    }

    /// Remove this state from the sink. Mirrors the source's destructor
    /// behaviour, called explicitly by the lifecycle coordinator on reinit.
    pub fn remove(&self) {
        if self.sink.is_connected() {
            self.sink.remove_state(&self.internal_name);
        }
    }
}

impl DatarefListener for TPState {
    fn dataref_changed(&self, _dataref: &Dataref) {
        let valstr = self.value();
        let mut previous = self.previous_value.lock().unwrap();
        if previous.as_deref() != Some(valstr.as_str()) {
            self.sink.state_update(&self.internal_name, &valstr);
            *previous = Some(valstr);
        }
    }

    fn name(&self) -> &str {
        &self.display_name
    }
}

fn format_value(datatype: &str, value: f64) -> String {
    if let Some(suffix) = datatype.strip_prefix("int") {
        let truncated = value as i64;
        return format_int(suffix, truncated);
    }
    if let Some(suffix) = datatype
        .strip_prefix("float")
        .or_else(|| datatype.strip_prefix("number"))
        .or_else(|| datatype.strip_prefix("decimal"))
    {
        return format_float(suffix, value);
    }
    match datatype {
        "boolean" | "bool" | "yesno" => {
            if value != 0.0 {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }
        }
        other => {
            warn!("unknown state datatype `{other}`");
            String::new()
        }
    }
}

fn format_int(suffix: &str, value: i64) -> String {
    if suffix.is_empty() {
        return value.to_string();
    }
    if let Ok(width) = suffix.trim_start_matches('0').parse::<usize>().or_else(|_| suffix.parse::<usize>()) {
        if suffix.starts_with('0') {
            return format!("{value:0width$}");
        }
        return format!("{value:width$}");
    }
    value.to_string()
}

fn format_float(suffix: &str, value: f64) -> String {
    if suffix.is_empty() {
        return value.to_string();
    }
    if let Some(precision_str) = suffix.strip_prefix('.') {
        if let Ok(precision) = precision_str.parse::<usize>() {
            return format!("{value:.precision$}");
        }
    }
    value.to_string()
}
