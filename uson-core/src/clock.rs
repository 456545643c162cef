//! Wrapping millisecond clock helpers
//!
//! Every timestamp in the link stack comes from one free-running `u32`
//! millisecond counter that wraps after ~49.7 days. Durations are computed
//! with wrapping subtraction; deadline checks use the signed difference.

/// Milliseconds from `since` to `now`
#[inline]
pub fn elapsed(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Deadline `duration_ms` after `now`
#[inline]
pub fn deadline(now: u32, duration_ms: u32) -> u32 {
    now.wrapping_add(duration_ms)
}

/// True while `now` has not yet reached `deadline`
#[inline]
pub fn is_before(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) < 0
}

/// True if sequence number `a` is strictly newer than `b`
#[inline]
pub fn is_newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_across_wrap() {
        assert_eq!(elapsed(100, 50), 50);
        assert_eq!(elapsed(10, u32::MAX - 9), 20);
    }

    #[test]
    fn test_deadline_across_wrap() {
        let until = deadline(u32::MAX - 100, 1000);
        assert_eq!(until, 899);
        assert!(is_before(u32::MAX - 50, until));
        assert!(is_before(500, until));
        assert!(!is_before(899, until));
        assert!(!is_before(1500, until));
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer(2, 1));
        assert!(!is_newer(1, 1));
        assert!(!is_newer(1, 2));
        assert!(is_newer(3, u32::MAX));
    }
}
