use crate::error::ConfigError;

/// Slot count of a freshly created table.
pub const DEFAULT_CAPACITY: usize = 8;

/// Maximum ratio of live entries to slots before the table doubles.
pub const DEFAULT_DENSITY_THRESHOLD: f64 = 0.5;

/// Maximum ratio of graves to slots before the table is rehashed in place.
pub const DEFAULT_GRAVE_THRESHOLD: f64 = 0.25;

/// Smallest accepted density threshold. Below it the first insertion would
/// need an absurd slot count to stay under the threshold.
pub const MIN_DENSITY_THRESHOLD: f64 = 1.0 / 1024.0;

/// Construction-time knobs of a [`HashTable`].
///
/// A configuration is fixed for the lifetime of the table it builds. The
/// setters do not validate; [`TableConfig::validate`] (called by every
/// `with_config*` constructor) does.
///
/// # Examples
///
/// ```rust
/// use probe_hash::TableConfig;
///
/// let config = TableConfig::new()
///     .with_initial_capacity(100)
///     .with_density_threshold(0.7)
///     .with_grave_threshold(0.2);
/// assert!(config.validate().is_ok());
///
/// let bad = TableConfig::new().with_density_threshold(0.9);
/// assert!(bad.validate().is_err());
/// ```
///
/// [`HashTable`]: crate::HashTable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableConfig {
    initial_capacity: usize,
    density_threshold: f64,
    grave_threshold: f64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TableConfig {
    /// The default configuration: 8 slots, density 0.5, graves 0.25.
    pub const fn new() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            density_threshold: DEFAULT_DENSITY_THRESHOLD,
            grave_threshold: DEFAULT_GRAVE_THRESHOLD,
        }
    }

    /// Sets the number of slots allocated up front. Rounded up to a power of
    /// two when the table is built.
    pub const fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the live-entries-to-slots ratio above which the table doubles.
    pub const fn with_density_threshold(mut self, threshold: f64) -> Self {
        self.density_threshold = threshold;
        self
    }

    /// Sets the graves-to-slots ratio above which the table is rehashed at
    /// the same capacity.
    pub const fn with_grave_threshold(mut self, threshold: f64) -> Self {
        self.grave_threshold = threshold;
        self
    }

    /// The requested initial slot count, before rounding.
    pub const fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    /// The density threshold.
    pub const fn density_threshold(&self) -> f64 {
        self.density_threshold
    }

    /// The grave threshold.
    pub const fn grave_threshold(&self) -> f64 {
        self.grave_threshold
    }

    /// Checks that the configuration leaves at least one empty slot on every
    /// probe cycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.initial_capacity.checked_next_power_of_two().is_none() {
            return Err(ConfigError::CapacityOverflow(self.initial_capacity));
        }
        if !(self.density_threshold >= MIN_DENSITY_THRESHOLD && self.density_threshold < 1.0) {
            return Err(ConfigError::DensityOutOfRange(self.density_threshold));
        }
        if !(self.grave_threshold > 0.0 && self.grave_threshold < 1.0) {
            return Err(ConfigError::GraveOutOfRange(self.grave_threshold));
        }
        if self.density_threshold + self.grave_threshold >= 1.0 {
            return Err(ConfigError::ThresholdSum {
                density: self.density_threshold,
                grave: self.grave_threshold,
            });
        }
        Ok(())
    }

    /// Slot count of a new table. Only meaningful on a validated config.
    pub(crate) fn initial_slots(&self) -> usize {
        self.initial_capacity.next_power_of_two()
    }

    #[inline(always)]
    pub(crate) fn exceeds_density(&self, len: usize, capacity: usize) -> bool {
        len as f64 > self.density_threshold * capacity as f64
    }

    #[inline(always)]
    pub(crate) fn exceeds_graves(&self, graves: usize, capacity: usize) -> bool {
        graves as f64 > self.grave_threshold * capacity as f64
    }

    /// Smallest power-of-two slot count, no smaller than `floor`, that holds
    /// `len` entries without crossing the density threshold.
    pub(crate) fn capacity_for(&self, len: usize, floor: usize) -> usize {
        let mut capacity = floor.max(1).checked_next_power_of_two().expect("capacity overflow");
        while self.exceeds_density(len, capacity) {
            capacity = capacity.checked_mul(2).expect("capacity overflow");
        }
        capacity
    }
}
