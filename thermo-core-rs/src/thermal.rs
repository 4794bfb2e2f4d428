//! Weighted-averaging update rules
//!
//! The coordinator weighs its own value 2 against each peripheral's 1; a
//! peripheral weighs its own value 3 against the central value's 2. Together
//! they form a linear iteration whose only fixed point has every value equal.

/// Weight of the coordinator's own value in its update
pub const CENTRAL_SELF_WEIGHT: f64 = 2.0;

/// Weight of a peripheral's own value in its update
pub const PERIPHERAL_SELF_WEIGHT: f64 = 3.0;

/// Weight of the received central value in a peripheral's update
pub const PERIPHERAL_CENTRAL_WEIGHT: f64 = 2.0;

/// Next central value from the current one and the peripheral values
///
/// `(2·central + Σ peripherals) / (2 + N)`
pub fn next_central<I>(central: f64, peripherals: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = peripherals
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (CENTRAL_SELF_WEIGHT * central + sum) / (CENTRAL_SELF_WEIGHT + count as f64)
}

/// Next external value of a peripheral after receiving `central`
///
/// `(3·external + 2·central) / 5`
pub fn next_external(external: f64, central: f64) -> f64 {
    (PERIPHERAL_SELF_WEIGHT * external + PERIPHERAL_CENTRAL_WEIGHT * central)
        / (PERIPHERAL_SELF_WEIGHT + PERIPHERAL_CENTRAL_WEIGHT)
}

/// Whether a value moved by no more than `epsilon` between two rounds
pub fn is_settled(previous: f64, current: f64, epsilon: f64) -> bool {
    (current - previous).abs() <= epsilon
}
