//! Scheduling configuration and deadline math.

use std::time::{Duration, SystemTime};

use tracing::warn;

/// How long before expiry each timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Lead time of the user-facing warning. Default: 120 seconds.
    pub warning_lead: Duration,
    /// Lead time of the automatic refresh. Default: 60 seconds.
    /// Must not exceed `warning_lead`, so the user is warned first.
    pub refresh_lead: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            warning_lead: Duration::from_secs(120),
            refresh_lead: Duration::from_secs(60),
        }
    }
}

impl ScheduleConfig {
    /// Fix out-of-order leads so the config is safe to use.
    ///
    /// Called automatically by [`ExpiryScheduler::new`](crate::ExpiryScheduler::new).
    /// `refresh_lead` is capped at `warning_lead`.
    pub fn validated(mut self) -> Self {
        if self.refresh_lead > self.warning_lead {
            warn!(
                refresh_lead_secs = self.refresh_lead.as_secs_f64(),
                warning_lead_secs = self.warning_lead.as_secs_f64(),
                "refresh_lead exceeds warning_lead, clamping"
            );
            self.refresh_lead = self.warning_lead;
        }
        self
    }

    /// Delays from `now` until each timer is due for a token expiring at
    /// `expires_at`. A deadline already in the past is due immediately.
    pub fn deadlines(&self, expires_at: SystemTime, now: SystemTime) -> Deadlines {
        let remaining = expires_at.duration_since(now).unwrap_or(Duration::ZERO);
        Deadlines {
            remaining,
            warning_in: remaining.saturating_sub(self.warning_lead),
            refresh_in: remaining.saturating_sub(self.refresh_lead),
        }
    }
}

/// Output of [`ScheduleConfig::deadlines`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    /// Time left until the token itself expires.
    pub remaining: Duration,
    pub warning_in: Duration,
    pub refresh_in: Duration,
}

impl Deadlines {
    /// `true` when the warning window has already been entered.
    pub fn warning_due(&self) -> bool {
        self.warning_in.is_zero()
    }

    /// `true` when the refresh window has already been entered.
    pub fn refresh_due(&self) -> bool {
        self.refresh_in.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_default_leads() {
        let cfg = ScheduleConfig::default();
        assert_eq!(cfg.warning_lead, Duration::from_secs(120));
        assert_eq!(cfg.refresh_lead, Duration::from_secs(60));
    }

    #[test]
    fn test_validated_clamps_refresh_lead() {
        let cfg = ScheduleConfig {
            warning_lead: Duration::from_secs(30),
            refresh_lead: Duration::from_secs(90),
        }
        .validated();
        assert_eq!(cfg.refresh_lead, Duration::from_secs(30));
    }

    #[test]
    fn test_deadlines_far_expiry() {
        let d = ScheduleConfig::default().deadlines(at(1_300), at(1_000));
        assert_eq!(d.remaining, Duration::from_secs(300));
        assert_eq!(d.warning_in, Duration::from_secs(180));
        assert_eq!(d.refresh_in, Duration::from_secs(240));
        assert!(!d.warning_due());
    }

    #[test]
    fn test_deadlines_inside_both_windows_are_immediate() {
        let d = ScheduleConfig::default().deadlines(at(1_030), at(1_000));
        assert!(d.warning_due());
        assert!(d.refresh_due());
    }

    #[test]
    fn test_deadlines_between_windows() {
        let d = ScheduleConfig::default().deadlines(at(1_090), at(1_000));
        assert!(d.warning_due());
        assert_eq!(d.refresh_in, Duration::from_secs(30));
    }

    #[test]
    fn test_deadlines_past_expiry_saturates() {
        let d = ScheduleConfig::default().deadlines(at(500), at(1_000));
        assert_eq!(d.remaining, Duration::ZERO);
        assert!(d.warning_due() && d.refresh_due());
    }
}
