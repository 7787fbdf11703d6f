//! Sizing of the compiled hidden-feature uniform array.
//!
//! The array length is baked into the shader, so every change costs a
//! recompile of each filtered material. Growth happens in power-of-two steps
//! above a fixed baseline; hide/unhide calls only recompile at crossings.

use crate::error::{FilterError, Result};

/// Smallest compiled array length.
pub const MIN_CAPACITY: usize = 32;

/// Capacity for `hidden` ids with the default baseline.
pub fn compute_capacity(hidden: usize, uniform_limit: usize) -> Result<usize> {
    compute_capacity_with(hidden, uniform_limit, MIN_CAPACITY)
}

/// Capacity for `hidden` ids above `baseline`.
///
/// Fails when the hidden set cannot fit the device's uniform budget at all.
pub fn compute_capacity_with(hidden: usize, uniform_limit: usize, baseline: usize) -> Result<usize> {
    if hidden > uniform_limit {
        return Err(FilterError::CapacityOverflow {
            requested: hidden,
            limit: uniform_limit,
        });
    }

    let baseline = normalize_baseline(baseline);
    if hidden <= baseline {
        Ok(baseline)
    } else {
        Ok(hidden.next_power_of_two())
    }
}

/// The array is uploaded as packed `vec4<f32>`, so the baseline is kept a
/// power of two no smaller than 4.
#[inline]
pub fn normalize_baseline(baseline: usize) -> usize {
    baseline.max(4).next_power_of_two()
}
