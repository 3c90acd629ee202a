use std::sync::Arc;

use crate::analysis::SkinAnalysisService;
use crate::handlers::access::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SkinAnalysisService>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(service: SkinAnalysisService, rate_limiter: Arc<RateLimiter>) -> Self {
        AppState {
            service: Arc::new(service),
            rate_limiter,
        }
    }
}
