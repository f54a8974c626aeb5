//! Fixed-edge bucketing used by the results summaries.

/// Count values per bucket for the given ascending edges.
///
/// Edges define `edges.len() - 1` buckets; each bucket is half-open
/// `[lo, hi)` except the last, which also includes its upper edge. Values
/// outside the overall range are dropped.
pub fn bucket_counts(values: &[f64], edges: &[f64]) -> Vec<u64> {
    if edges.len() < 2 {
        return Vec::new();
    }
    let mut counts = vec![0u64; edges.len() - 1];
    let last = counts.len() - 1;
    for &v in values {
        if !v.is_finite() {
            continue;
        }
        for b in 0..counts.len() {
            let in_bucket = if b == last {
                v >= edges[b] && v <= edges[b + 1]
            } else {
                v >= edges[b] && v < edges[b + 1]
            };
            if in_bucket {
                counts[b] += 1;
                break;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_value_per_bucket() {
        let counts = bucket_counts(&[0.1, 0.4, 0.9], &[0.0, 0.33, 0.66, 1.0]);
        assert_eq!(counts, vec![1, 1, 1]);
    }

    #[test]
    fn test_upper_edge_lands_in_last_bucket() {
        let counts = bucket_counts(&[0.5, 1.0], &[0.0, 0.5, 1.0]);
        assert_eq!(counts, vec![0, 2]);
    }

    #[test]
    fn test_out_of_range_values_dropped() {
        let counts = bucket_counts(&[-0.1, 0.2, 1.5, f64::NAN], &[0.0, 0.5, 1.0]);
        assert_eq!(counts, vec![1, 0]);
    }

    #[test]
    fn test_degenerate_edges() {
        assert!(bucket_counts(&[0.5], &[0.0]).is_empty());
        assert!(bucket_counts(&[0.5], &[]).is_empty());
    }
}
