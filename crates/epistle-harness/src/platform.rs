//! Test doubles for device services and decryption.

use std::{
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use epistle_app::{Platform, UserSettings};
use epistle_core::{DecryptError, Decryptor};

/// Bodies starting with this prefix fail to decrypt under [`PlainDecryptor`].
pub const CORRUPT_PREFIX: &str = "corrupt:";

/// Decryptor for plaintext bodies stored by [`crate::SimServer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainDecryptor;

impl Decryptor for PlainDecryptor {
    fn decrypt(&self, body: &str) -> Result<String, DecryptError> {
        if body.starts_with(CORRUPT_PREFIX) {
            return Err(DecryptError::new("corrupt ciphertext"));
        }
        Ok(body.to_string())
    }
}

/// A local notification that was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownNotification {
    /// Conversation id.
    pub convo_id: String,
    /// Title shown.
    pub title: String,
    /// Message count.
    pub count: usize,
}

/// [`Platform`] that records every side effect.
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    notifications_disabled: AtomicBool,
    vibration_disabled: AtomicBool,
    sleeping: AtomicBool,
    silenced: AtomicBool,
    vibrations: Mutex<Vec<Duration>>,
    notifications: Mutex<Vec<ShownNotification>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingPlatform {
    /// Awake, not silenced, everything enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put the app to sleep or wake it.
    pub fn set_sleeping(&self, sleeping: bool) {
        self.sleeping.store(sleeping, Ordering::SeqCst);
    }

    /// Toggle the silent switch.
    pub fn set_silenced(&self, silenced: bool) {
        self.silenced.store(silenced, Ordering::SeqCst);
    }

    /// Replace user settings.
    pub fn set_settings(&self, settings: UserSettings) {
        self.notifications_disabled.store(!settings.notifications_enabled, Ordering::SeqCst);
        self.vibration_disabled.store(!settings.vibration_enabled, Ordering::SeqCst);
    }

    /// Vibrations run so far.
    pub fn vibrations(&self) -> Vec<Duration> {
        lock(&self.vibrations).clone()
    }

    /// Notifications shown so far.
    pub fn notifications(&self) -> Vec<ShownNotification> {
        lock(&self.notifications).clone()
    }
}

impl Platform for RecordingPlatform {
    fn settings(&self) -> UserSettings {
        UserSettings {
            notifications_enabled: !self.notifications_disabled.load(Ordering::SeqCst),
            vibration_enabled: !self.vibration_disabled.load(Ordering::SeqCst),
        }
    }

    fn is_app_sleeping(&self) -> bool {
        self.sleeping.load(Ordering::SeqCst)
    }

    fn is_silenced(&self) -> bool {
        self.silenced.load(Ordering::SeqCst)
    }

    fn vibrate(&self, duration: Duration) {
        lock(&self.vibrations).push(duration);
    }

    fn notify(&self, convo_id: &str, title: &str, count: usize) {
        lock(&self.notifications).push(ShownNotification {
            convo_id: convo_id.to_string(),
            title: title.to_string(),
            count,
        });
    }
}
