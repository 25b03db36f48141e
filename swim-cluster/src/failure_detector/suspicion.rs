use std::sync::Arc;
use std::time::Duration;

use swim_core::ext::duration_ext::ScaleExt;

/// The upper bound of the suspicion timeout as a multiple of the lower bound.
pub const SUSPICION_MAX_TIMEOUT_MULT: u32 = 6;

/// Input of a suspicion timeout function, evaluated each time a suspected
/// peer is checked.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SuspicionContext {
    pub suspicion_mult: u32,
    /// Alive and Suspect peers, the local node included.
    pub cluster_size: usize,
    /// Nodes that reported the suspicion, the first reporter included.
    pub confirmations: usize,
    pub probe_interval: Duration,
}

impl SuspicionContext {
    /// Reporters beyond the first one.
    pub fn independent_confirmations(&self) -> usize {
        self.confirmations.saturating_sub(1)
    }
}

pub type SuspicionTimeoutFn = Arc<dyn Fn(&SuspicionContext) -> Duration + Send + Sync>;

/// Independent confirmations that declare a suspect dead right away,
/// `ceil(mult * log10(n))` capped by the number of peers able to confirm.
/// `None` when no other peer is around to confirm.
pub fn required_confirmations(suspicion_mult: u32, cluster_size: usize) -> Option<usize> {
    // neither the suspect nor the first reporter can confirm
    let available = cluster_size.saturating_sub(2);
    let wanted = (suspicion_mult as f64 * (cluster_size.max(1) as f64).log10()).ceil() as usize;
    let required = wanted.min(available);
    (required > 0).then_some(required)
}

/// Starts at `SUSPICION_MAX_TIMEOUT_MULT` times the minimum and shrinks
/// logarithmically towards the minimum as confirmations arrive, the minimum
/// being `mult * max(1, log10(n)) * probe_interval`.
pub fn default_suspicion_timeout(context: &SuspicionContext) -> Duration {
    let node_scale = (context.cluster_size.max(1) as f64).log10().max(1.0);
    let min = context
        .probe_interval
        .scale(context.suspicion_mult as f64 * node_scale);
    let Some(required) = required_confirmations(context.suspicion_mult, context.cluster_size)
    else {
        return min;
    };
    let confirmed = context.independent_confirmations();
    if confirmed >= required {
        return min;
    }
    let max = min.saturating_mul(SUSPICION_MAX_TIMEOUT_MULT);
    let progress = ((confirmed + 1) as f64).ln() / ((required + 1) as f64).ln();
    max.saturating_sub(max.saturating_sub(min).scale(progress)).max(min)
}
