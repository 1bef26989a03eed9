use crate::domain::track::TrackRecord;

/// Derives a file-name friendly identifier from a track title.
///
/// Lowercases, drops everything but ASCII word characters, whitespace and `-`,
/// then joins the words with single hyphens. `"Ashes (Live)"` becomes `"ashes-live"`.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let kept: String = lowered
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let mut slug = String::with_capacity(kept.len());
    for c in kept.chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug
}

/// Gives every record without an identifier one derived from its title.
///
/// Existing identifiers are never touched. Returns how many records got a new one.
pub fn assign_missing_ids(records: &mut [TrackRecord]) -> usize {
    let mut assigned = 0;

    for (i, record) in records.iter_mut().enumerate() {
        if record.id().is_some() {
            continue;
        }
        let Some(title) = record.title() else {
            log::warn!("{}. record has neither 'id' nor 'title' - skipping", i + 1);
            continue;
        };

        let id = slugify(title);
        if id.is_empty() {
            log::warn!("{}. \"{}\" gives an empty id - skipping", i + 1, title);
            continue;
        }

        log::info!("{}. \"{}\" -> id: \"{}\"", i + 1, title, id);
        record.set_id(id);
        assigned += 1;
    }

    assigned
}
