#[cfg(target_arch = "wasm32")]
pub(crate) fn now_ms() -> i64 {
    js_sys::Date::now().round() as i64
}

/// Moves the listed ids to the front in the given order. Unknown ids are
/// ignored, duplicates count once, unlisted ids keep their relative order
/// after the listed ones.
pub(crate) fn reorder_by_ids<T>(items: Vec<T>, order: &[String], id: impl Fn(&T) -> &str) -> Vec<T> {
    let mut rest: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(rest.len());

    for want in order {
        if let Some(slot) = rest
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|t| id(t) == want.as_str()))
        {
            if let Some(t) = slot.take() {
                out.push(t);
            }
        }
    }
    out.extend(rest.into_iter().flatten());
    out
}
