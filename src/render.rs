//! Renders labeled series for a response body.

use crate::types::forecast::LabeledSeries;

/// Serializes the series as a JSON array of `{label, unit, data}` objects.
pub fn to_json(series: &[LabeledSeries]) -> serde_json::Result<String> {
    serde_json::to_string(series)
}

/// Lays the series out as rows, one per timestamp.
///
/// The first column holds the epoch-millisecond timestamp, followed by one column per
/// series headed `label [unit]`. Rows cover the union of all timestamps in ascending
/// order; a series without a sample at a row's timestamp, or with a missing reading,
/// leaves its cell empty.
pub fn to_delimited(series: &[LabeledSeries], separator: char) -> String {
    let mut out = String::new();
    out.push_str("timestamp");
    for s in series {
        out.push(separator);
        out.push_str(&format!("{} [{}]", s.label, s.unit));
    }
    out.push('\n');

    // One cursor per series; all series are sorted, so the next row is the smallest
    // timestamp under any cursor.
    let mut cursors = vec![0usize; series.len()];
    loop {
        let next = series
            .iter()
            .zip(&cursors)
            .filter_map(|(s, &i)| s.data.samples().get(i).map(|sample| sample.timestamp))
            .min();
        let Some(timestamp) = next else {
            break;
        };
        out.push_str(&timestamp.to_string());
        for (s, cursor) in series.iter().zip(cursors.iter_mut()) {
            out.push(separator);
            if let Some(sample) = s.data.samples().get(*cursor) {
                if sample.timestamp == timestamp {
                    if !sample.value.is_nan() {
                        out.push_str(&sample.value.to_string());
                    }
                    *cursor += 1;
                }
            }
        }
        out.push('\n');
    }
    out
}
