//! Default model and solver parameters

/// Received power at 1 m used when the config carries no `txPower` (dBm)
pub const DEFAULT_REF_POWER: f64 = -49.0;

/// Path-loss exponent used when the config carries no `n_factor`
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = 3.1;

pub const DEFAULT_DAMPING: f64 = 0.02;
pub const DEFAULT_INITIAL_GUESS: (f64, f64) = (5.0, 5.0);
pub const DEFAULT_GRADIENT_STEP: f64 = 1e-6;
pub const DEFAULT_MAX_ITERATIONS: usize = 100;
pub const DEFAULT_ERROR_TOLERANCE: f64 = 1e-3;

/// Maximum age of a reading still used for positioning (milliseconds)
pub const DEFAULT_MAX_READING_AGE_MS: u64 = 60_000;

/// Interval between config file reloads (milliseconds)
pub const DEFAULT_RELOAD_INTERVAL_MS: u64 = 5_000;

/// Minimum number of anchor observations for a 2D fix
pub const MIN_OBSERVATIONS: usize = 3;
