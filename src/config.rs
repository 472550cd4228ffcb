use chrono::TimeDelta;

/// Recognized simulator options, defaults matching the reference setup.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Minutes of virtual time per tick.
    pub alg_run_frequency: i64,
    /// Wall-clock bound on one dispatch invocation, in seconds.
    pub max_runtime_of_algorithm: u64,
    /// Weight of lateness against driven distance in the objective.
    pub lamda: f64,
    pub random_seed: u64,
    /// Line the external dispatch process must print on success.
    pub algorithm_success_flag: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            alg_run_frequency: 10,
            max_runtime_of_algorithm: 600,
            lamda: 10.0,
            random_seed: 10_000,
            algorithm_success_flag: "SUCCESS".to_string(),
        }
    }
}

impl SimConfig {
    pub fn tick_interval(&self) -> TimeDelta {
        TimeDelta::minutes(self.alg_run_frequency)
    }

    pub fn dispatch_runtime_bound(&self) -> TimeDelta {
        TimeDelta::seconds(self.max_runtime_of_algorithm as i64)
    }
}
