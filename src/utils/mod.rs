pub mod time;

/// A url-safe random identifier for runs, tasks and history records.
pub fn longid() -> String {
    nanoid::nanoid!()
}

/// Keep `[A-Za-z0-9._-]`, falling back to `output` when nothing survives.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')).collect();
    if cleaned.is_empty() {
        "output".to_string()
    } else {
        cleaned
    }
}
