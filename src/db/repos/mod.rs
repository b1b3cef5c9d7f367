pub mod course_settings;
pub mod courses;
pub mod llm_models;
pub mod organization_settings;
pub mod organizations;
pub mod providers;

/// `?start, ?start+1, ...` for an `IN (...)` list of `count` bound values.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
