//! Platform services the controller needs from its host.
//!
//! The [`Platform`] trait decouples the coordinator from device APIs
//! (vibration motor, notification center, silent switch, user settings). Each
//! frontend implements it; tests use a recording implementation.

use std::time::Duration;

/// User preferences that gate side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSettings {
    /// Local notifications allowed.
    pub notifications_enabled: bool,
    /// Vibration allowed.
    pub vibration_enabled: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self { notifications_enabled: true, vibration_enabled: true }
    }
}

/// Device services for new-message side effects.
///
/// Every query is made at the moment of the side effect; nothing is cached.
pub trait Platform: Send + Sync + 'static {
    /// Current user settings.
    fn settings(&self) -> UserSettings;

    /// App is suspended or not in the foreground.
    fn is_app_sleeping(&self) -> bool;

    /// Device is in silent or do-not-disturb mode.
    fn is_silenced(&self) -> bool;

    /// Vibrate for `duration`.
    fn vibrate(&self, duration: Duration);

    /// Show a local notification for `count` new messages in `convo_id`.
    fn notify(&self, convo_id: &str, title: &str, count: usize);
}

/// Which side effects to run for one batch of new messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlertDecision {
    /// Run a short vibration.
    pub vibrate: bool,
    /// Show a local notification.
    pub notify: bool,
}

/// Apply the side-effect rules.
///
/// Vibration needs the app awake, the device not silenced and the setting
/// on. A notification needs the app asleep and the setting on.
pub fn decide_alert(settings: UserSettings, app_sleeping: bool, silenced: bool) -> AlertDecision {
    AlertDecision {
        vibrate: !app_sleeping && !silenced && settings.vibration_enabled,
        notify: app_sleeping && settings.notifications_enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ON: UserSettings = UserSettings { notifications_enabled: true, vibration_enabled: true };

    #[test]
    fn awake_device_vibrates() {
        assert_eq!(
            decide_alert(ALL_ON, false, false),
            AlertDecision { vibrate: true, notify: false }
        );
    }

    #[test]
    fn silenced_device_stays_still() {
        assert!(!decide_alert(ALL_ON, false, true).vibrate);
    }

    #[test]
    fn sleeping_app_notifies_instead() {
        assert_eq!(
            decide_alert(ALL_ON, true, false),
            AlertDecision { vibrate: false, notify: true }
        );
    }

    #[test]
    fn settings_gate_both() {
        let off = UserSettings { notifications_enabled: false, vibration_enabled: false };
        assert_eq!(decide_alert(off, false, false), AlertDecision::default());
        assert_eq!(decide_alert(off, true, false), AlertDecision::default());
    }
}
