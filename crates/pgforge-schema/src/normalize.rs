/// Trim, drop empties, sort, and deduplicate.
///
/// Package sets carry no intrinsic order, so anything emitted from them goes
/// through here to keep generated output reproducible.
pub fn normalize_string_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}
