//! The `$random(min,max)` function.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

use crate::{Result, ScrapeError};

static RANDOM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\$random\((.*)\)$").unwrap());

/// Evaluate a `$random(min,max)` call, drawing a fresh integer in `[min, max]`.
pub fn evaluate(expr: &str) -> Result<i64> {
    let expr = expr.trim();
    let caps = RANDOM_RE.captures(expr).ok_or_else(|| ScrapeError::InvalidRange(format!("malformed call '{}'", expr)))?;
    let args: Vec<&str> = caps[1].split(',').map(str::trim).collect();

    let [min, max] = args.as_slice() else {
        return Err(ScrapeError::InvalidRange(format!("'{}' expects two integer arguments", expr)));
    };
    let (Ok(min), Ok(max)) = (min.parse::<i64>(), max.parse::<i64>()) else {
        return Err(ScrapeError::InvalidRange(format!("'{}' expects two integer arguments", expr)));
    };

    draw(min, max)
}

pub fn draw(
    min: i64,
    max: i64,
) -> Result<i64> {
    if min > max {
        return Err(ScrapeError::InvalidRange(format!("min {} is greater than max {}", min, max)));
    }
    Ok(rand::rng().random_range(min..=max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_stays_in_range() {
        for _ in 0..500 {
            let v = evaluate("$random(1000000000,9999999999)").unwrap();
            assert!((1_000_000_000..=9_999_999_999).contains(&v));
        }
        for _ in 0..200 {
            let v = evaluate("$random( -3 , 3 )").unwrap();
            assert!((-3..=3).contains(&v));
        }
    }

    #[test]
    fn test_equal_bounds() {
        assert_eq!(evaluate("$random(7,7)").unwrap(), 7);
    }

    #[test]
    fn test_min_greater_than_max() {
        for _ in 0..10 {
            assert!(matches!(evaluate("$random(5,1)"), Err(ScrapeError::InvalidRange(_))));
        }
    }

    #[test]
    fn test_draws_are_independent() {
        let draws: std::collections::HashSet<i64> = (0..50).map(|_| evaluate("$random(1,1000000)").unwrap()).collect();
        assert!(draws.len() > 1);
    }

    #[test]
    fn test_malformed_arguments() {
        assert!(matches!(evaluate("$random(1)"), Err(ScrapeError::InvalidRange(_))));
        assert!(matches!(evaluate("$random(a,b)"), Err(ScrapeError::InvalidRange(_))));
        assert!(matches!(evaluate("$random(1,2"), Err(ScrapeError::InvalidRange(_))));
    }
}
