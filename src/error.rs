/// Errors produced when validating a [`TableConfig`].
///
/// Lookups, insertions and removals never fail with an error: a duplicate key
/// or a missing key is reported through `bool`/`Option` returns. Only the
/// construction-time knobs can be rejected.
///
/// [`TableConfig`]: crate::config::TableConfig
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The initial capacity was zero.
    #[error("initial capacity must be non-zero")]
    ZeroCapacity,
    /// The initial capacity cannot be rounded up to a power of two.
    #[error("initial capacity {0} overflows when rounded to a power of two")]
    CapacityOverflow(usize),
    /// The density threshold is below [`MIN_DENSITY_THRESHOLD`] or not
    /// below one.
    ///
    /// [`MIN_DENSITY_THRESHOLD`]: crate::config::MIN_DENSITY_THRESHOLD
    #[error("density threshold {0} must lie in [1/1024, 1)")]
    DensityOutOfRange(f64),
    /// The grave threshold is not strictly between zero and one.
    #[error("grave threshold {0} must lie in (0, 1)")]
    GraveOutOfRange(f64),
    /// Live entries and graves together could fill every slot, which would
    /// leave probing without a terminating empty slot.
    #[error("density threshold {density} plus grave threshold {grave} must be below 1")]
    ThresholdSum {
        /// The configured density threshold.
        density: f64,
        /// The configured grave threshold.
        grave: f64,
    },
}
