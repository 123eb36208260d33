//! Scenario numbering over the dimension cross-product.
//!
//! Scenarios are numbered in mixed radix with the first dimension varying
//! fastest: with dimensions of sizes `[2, 3]`, scenario 1 is point 1 of
//! the first dimension and point 0 of the second, and scenario 2 is
//! point 0 of the first and point 1 of the second.

/// Number of scenarios for dimensions of the given sizes.
///
/// No dimensions gives exactly one scenario; any empty dimension gives
/// none.
pub fn scenario_count(sizes: &[usize]) -> usize {
    sizes.iter().product()
}

/// Point index in each dimension for `scenario`.
pub fn point_indices(scenario: usize, sizes: &[usize]) -> Vec<usize> {
    let mut rest = scenario;
    sizes
        .iter()
        .map(|&size| {
            let index = rest % size;
            rest /= size;
            index
        })
        .collect()
}
