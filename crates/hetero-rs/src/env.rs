use std::env;
use std::sync::OnceLock;

static HETERO_DUMP_GRAPH: OnceLock<bool> = OnceLock::new();
static HETERO_VALIDATE: OnceLock<Option<bool>> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn read_flag(name: &str) -> Option<bool> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(parse_bool(&value)),
        _ => None,
    }
}

pub(crate) fn dump_graph_enabled() -> bool {
    *HETERO_DUMP_GRAPH.get_or_init(|| read_flag("HETERO_DUMP_GRAPH").unwrap_or(false))
}

pub(crate) fn validate_override() -> Option<bool> {
    *HETERO_VALIDATE.get_or_init(|| read_flag("HETERO_VALIDATE"))
}
