/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Round to one decimal place. Every XP and minute value shown or persisted
/// goes through this so repeated `+= 0.1` never drifts into `0.30000000000000004`.
pub fn round_tenth(value: f64) -> f64 {
    round_to(value, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_tenth_increments_stay_clean() {
        let mut total = 0.0;
        for _ in 0..3 {
            total = round_tenth(total + 0.1);
        }
        assert_eq!(total, 0.3);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_tenth(0.05), 0.1);
        assert_eq!(round_tenth(0.04), 0.0);
        assert_eq!(round_to(2.346, 2), 2.35);
    }
}
