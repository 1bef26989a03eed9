//! Fills in the `art` field of every record from a cover search

use std::{thread, time::Duration};

use crate::domain::track::TrackRecord;

pub mod search;

use search::CoverLookup;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub updated: usize,
    /// records where the lookup failed or found nothing
    pub unchanged: usize,
}

/// Looks up a cover for each record in order and stores it on success.
///
/// A failed or empty lookup leaves the record exactly as it was, including any
/// artwork it already had. `delay` is slept between two consecutive lookups.
pub fn enrich(
    records: &mut [TrackRecord],
    lookup: &impl CoverLookup,
    delay: Duration,
) -> EnrichReport {
    let mut report = EnrichReport::default();
    let total = records.len();

    for (i, record) in records.iter_mut().enumerate() {
        if i > 0 && !delay.is_zero() {
            thread::sleep(delay);
        }

        let title = record.title().unwrap_or_default().to_string();
        log::info!("Processing {}/{}: {}", i + 1, total, title);

        match lookup.cover_for(&title) {
            Ok(Some(cover)) => {
                log::info!("  Updated art: {cover}");
                record.set_art(cover);
                report.updated += 1;
            }
            Ok(None) => {
                log::warn!("  No data found, keeping original");
                report.unchanged += 1;
            }
            Err(e) => {
                log::error!("  Error fetching data for {title}: {e}");
                report.unchanged += 1;
            }
        }
    }

    report
}
