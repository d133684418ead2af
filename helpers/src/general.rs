use std::str::FromStr;

/// argmax_where returns the index of the maximum value in the array x among the indices accepted
/// by the mask. Only a strictly greater value replaces the current maximum, i.e. ties keep the
/// lowest index. None is returned if the mask accepts no index.
pub fn argmax_where<T, F>(x: &[T], mask: F) -> Option<usize>
where
    T: std::cmp::PartialOrd + std::marker::Copy,
    F: Fn(usize) -> bool,
{
    let mut idx_max: Option<usize> = None;

    for (i, &val) in x.iter().enumerate() {
        if !mask(i) {
            continue;
        }

        let improves = match idx_max {
            Some(idx) => val > x[idx],
            None => true,
        };

        if improves {
            idx_max = Some(i);
        }
    }

    idx_max
}

#[derive(Debug, Clone, Copy)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// argsort returns the indices that would sort an array. Incomparable values (NaN) are treated as
/// equal, the sort is stable.
pub fn argsort<T: std::cmp::PartialOrd>(x: &[T], order: SortOrder) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..x.len()).collect();
    match order {
        SortOrder::Ascending => indices.sort_by(|&a, &b| {
            x[a].partial_cmp(&x[b]).unwrap_or(std::cmp::Ordering::Equal)
        }),
        SortOrder::Descending => indices.sort_by(|&a, &b| {
            x[b].partial_cmp(&x[a]).unwrap_or(std::cmp::Ordering::Equal)
        }),
    }
    indices
}

/// parse_or_default parses the (trimmed) text and returns the default if parsing fails or the
/// parsed value is rejected by the validity check.
pub fn parse_or_default<T, F>(text: &str, default: T, valid: F) -> T
where
    T: FromStr,
    F: Fn(&T) -> bool,
{
    match text.trim().parse::<T>() {
        Ok(val) if valid(&val) => val,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_where_keeps_lowest_index_on_ties() {
        let x = [0.5, 0.9, 0.9, 0.1];
        assert_eq!(argmax_where(&x, |_| true), Some(1));
    }

    #[test]
    fn argmax_where_respects_mask() {
        let x = [0.5, 0.9, 0.7, 0.1];
        assert_eq!(argmax_where(&x, |i| i != 1), Some(2));
        assert_eq!(argmax_where(&x, |_| false), None);
    }

    #[test]
    fn argmax_where_accepts_zero_values() {
        let x = [0.0_f32, 0.0];
        assert_eq!(argmax_where(&x, |i| i == 1), Some(1));
    }

    #[test]
    fn argsort_descending() {
        let x = [3.0, 1.0, 2.0];
        assert_eq!(argsort(&x, SortOrder::Descending), vec![0, 2, 1]);
        assert_eq!(argsort(&x, SortOrder::Ascending), vec![1, 2, 0]);
    }

    #[test]
    fn parse_or_default_falls_back() {
        assert_eq!(parse_or_default::<u32, _>(" 42 ", 30, |_| true), 42);
        assert_eq!(parse_or_default::<u32, _>("abc", 30, |_| true), 30);
        assert_eq!(parse_or_default::<u32, _>("", 30, |_| true), 30);
        assert_eq!(parse_or_default::<u32, _>("1000", 30, |&v| v <= 999), 30);
    }
}
