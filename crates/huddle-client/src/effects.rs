use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use huddle_types::{Member, Message};

use crate::error::CapabilityUnavailable;

/// Vibration patterns, as on/off durations in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticPattern {
    Light,
    Medium,
    Heavy,
    Success,
    Warning,
    Error,
    DoorKnock,
}

impl HapticPattern {
    pub fn durations(self) -> &'static [u64] {
        match self {
            Self::Light | Self::Medium | Self::Heavy | Self::Success | Self::DoorKnock => &[5],
            Self::Warning => &[50, 25, 50],
            Self::Error => &[100, 50, 100],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Notifications with the same tag replace each other.
    pub tag: String,
    pub title: String,
    pub body: String,
}

pub trait Haptics: Send + Sync {
    fn vibrate(&self, pattern: HapticPattern) -> Result<(), CapabilityUnavailable>;
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), CapabilityUnavailable>;
}

/// Stand-in for platforms with neither capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl Haptics for Unsupported {
    fn vibrate(&self, _pattern: HapticPattern) -> Result<(), CapabilityUnavailable> {
        Err(CapabilityUnavailable("haptics"))
    }
}

impl Notifier for Unsupported {
    fn notify(&self, _notification: &Notification) -> Result<(), CapabilityUnavailable> {
        Err(CapabilityUnavailable("notifications"))
    }
}

/// Turns reconciler signals into haptic and notification calls.
///
/// Capability failures are logged and dropped; nothing here can fail the
/// caller. Haptics always fire, notifications only while the app is in the
/// background.
pub struct EffectDispatcher {
    haptics: Arc<dyn Haptics>,
    notifier: Arc<dyn Notifier>,
    foreground: AtomicBool,
}

impl EffectDispatcher {
    pub fn new(haptics: Arc<dyn Haptics>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            haptics,
            notifier,
            foreground: AtomicBool::new(true),
        }
    }

    /// A dispatcher whose every effect is a no-op.
    pub fn disabled() -> Self {
        Self::new(Arc::new(Unsupported), Arc::new(Unsupported))
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.foreground.store(foreground, Ordering::Relaxed);
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::Relaxed)
    }

    pub fn on_new_remote_message(&self, message: &Message) {
        self.haptic(HapticPattern::Light);
        if !self.is_foreground() {
            self.notification(Notification {
                tag: format!("chat-{}", message.room_id),
                title: message.author_display_name.clone(),
                body: message.content.clone(),
            });
        }
    }

    pub fn on_member_joined(&self, member: &Member) {
        debug!("{} joined room {}", member.display_name, member.room_id);
        self.haptic(HapticPattern::DoorKnock);
    }

    pub fn on_send_accepted(&self) {
        self.haptic(HapticPattern::Success);
    }

    pub fn on_send_failed(&self) {
        self.haptic(HapticPattern::Error);
    }

    fn haptic(&self, pattern: HapticPattern) {
        if let Err(e) = self.haptics.vibrate(pattern) {
            debug!("Skipping {:?} haptic: {}", pattern, e);
        }
    }

    fn notification(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification) {
            debug!("Skipping notification {}: {}", notification.tag, e);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every capability call.
    #[derive(Default)]
    pub struct Recorder {
        pub haptics: Mutex<Vec<HapticPattern>>,
        pub notifications: Mutex<Vec<Notification>>,
    }

    impl Recorder {
        pub fn haptics(&self) -> Vec<HapticPattern> {
            self.haptics.lock().unwrap().clone()
        }

        pub fn notifications(&self) -> Vec<Notification> {
            self.notifications.lock().unwrap().clone()
        }
    }

    impl Haptics for Recorder {
        fn vibrate(&self, pattern: HapticPattern) -> Result<(), CapabilityUnavailable> {
            self.haptics.lock().unwrap().push(pattern);
            Ok(())
        }
    }

    impl Notifier for Recorder {
        fn notify(&self, notification: &Notification) -> Result<(), CapabilityUnavailable> {
            self.notifications.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    pub fn recording() -> (Arc<Recorder>, EffectDispatcher) {
        let recorder = Arc::new(Recorder::default());
        let effects = EffectDispatcher::new(recorder.clone(), recorder.clone());
        (recorder, effects)
    }
}
