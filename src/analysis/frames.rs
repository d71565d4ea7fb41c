//! Frame resampling onto a fixed frame count
//!
//! Analyzer output length depends on its internal windowing, so every
//! descriptor is forced to the target length here before rows are built.
//! Long sequences are cut at the tail, short ones are edge-padded with their
//! last value. No interpolation happens in either direction.

use super::traits::DescriptorTable;

/// Fit a descriptor sequence to exactly `target` values
///
/// An empty input pads with 0.0.
pub fn fit_to_frames(values: &[f32], target: usize) -> Vec<f32> {
    if values.len() >= target {
        return values[..target].to_vec();
    }

    let fill = values.last().copied().unwrap_or(0.0);
    let mut out = Vec::with_capacity(target);
    out.extend_from_slice(values);
    out.resize(target, fill);
    out
}

/// Fit every row of a table to exactly `target` frames
pub fn fit_table_to_frames(table: &DescriptorTable, target: usize) -> DescriptorTable {
    DescriptorTable::new(
        table
            .rows
            .iter()
            .map(|row| fit_to_frames(row, target))
            .collect(),
    )
}

/// Timestamps in seconds for `count` frames spaced `hop` samples apart
pub fn frames_to_time(count: usize, hop: usize, sample_rate: u32) -> Vec<f64> {
    (0..count)
        .map(|i| (i * hop) as f64 / sample_rate as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_padding_repeats_last_value() {
        assert_eq!(
            fit_to_frames(&[1.0, 2.0, 3.0], 5),
            vec![1.0, 2.0, 3.0, 3.0, 3.0]
        );
    }

    #[test]
    fn test_truncation_keeps_head() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        assert_eq!(fit_to_frames(&values, 5), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_exact_length_unchanged() {
        let values = [0.5, 0.25];
        assert_eq!(fit_to_frames(&values, 2), values.to_vec());
    }

    #[test]
    fn test_empty_input_pads_zero() {
        assert_eq!(fit_to_frames(&[], 3), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_table_rows_fit_independently() {
        let table = DescriptorTable::new(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let fitted = fit_table_to_frames(&table, 4);
        assert_eq!(fitted.rows[0], vec![1.0, 2.0, 2.0, 2.0]);
        assert_eq!(fitted.rows[1], vec![3.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_frames_to_time() {
        let times = frames_to_time(4, 4410, 44100);
        assert_eq!(times.len(), 4);
        assert!((times[3] - 0.3).abs() < 1e-12);
    }
}
