use crate::alloc::DonorPolicy;

pub struct StitchArgs {
    pub(super) platform: String,
    pub(super) policy: DonorPolicy,
    pub(super) allow_reuse: bool,
}

impl Default for StitchArgs {
    fn default() -> Self {
        Self { platform: "AKG".to_string(), policy: DonorPolicy::LastCompatible, allow_reuse: true }
    }
}

impl StitchArgs {
    /// Platform string stamped on every emitted sub-kernel.
    pub fn platform(mut self, platform: &str) -> Self {
        self.platform = platform.to_string();
        self
    }

    pub fn best_fit_donors(mut self) -> Self {
        self.policy = DonorPolicy::BestFit;
        self
    }

    pub fn disable_reuse(mut self) -> Self {
        self.allow_reuse = false;
        self
    }
}
