//! One-shot change registrations shared by backends.

use std::{
    fmt, ops,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use tracing::trace;

use crate::{HKey, event::WaitEvent, path};

/// Kinds of change a registration can ask to be told about.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NotifyFilter(u32);

impl NotifyFilter {
    /// A subkey was added or deleted.
    pub const NAME: NotifyFilter = NotifyFilter(0x1);
    pub const ATTRIBUTES: NotifyFilter = NotifyFilter(0x2);
    /// A value was set or deleted.
    pub const LAST_SET: NotifyFilter = NotifyFilter(0x4);
    pub const SECURITY: NotifyFilter = NotifyFilter(0x8);

    pub const ALL: NotifyFilter =
        NotifyFilter(Self::NAME.0 | Self::ATTRIBUTES.0 | Self::LAST_SET.0 | Self::SECURITY.0);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn intersects(self, other: NotifyFilter) -> bool {
        self.0 & other.0 != 0
    }
}

impl ops::BitOr for NotifyFilter {
    type Output = NotifyFilter;

    fn bitor(self, rhs: NotifyFilter) -> NotifyFilter {
        NotifyFilter(self.0 | rhs.0)
    }
}

impl fmt::Debug for NotifyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotifyFilter({:#x})", self.0)
    }
}

#[derive(Debug)]
struct Registration {
    owner: HKey,
    path: String,
    subtree: bool,
    filter: NotifyFilter,
    event: Weak<WaitEvent>,
}

impl Registration {
    fn matches(&self, changed: &str, kind: NotifyFilter) -> bool {
        if !self.filter.intersects(kind) {
            return false;
        }
        if self.subtree {
            path::is_within(changed, &self.path)
        } else {
            changed == self.path
        }
    }
}

/// Pending one-shot registrations, keyed by folded node path.
///
/// Each registration fires at most once and is removed when it fires, when
/// its owning handle is closed, or when its wait object has been dropped.
#[derive(Debug, Default)]
pub struct WatchList {
    registrations: Mutex<Vec<Registration>>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(
        &self,
        owner: HKey,
        path: String,
        subtree: bool,
        filter: NotifyFilter,
        event: &Arc<WaitEvent>,
    ) {
        let event = Arc::downgrade(event);
        let mut registrations = self.lock();
        // Re-arming through the same handle with the same event replaces the
        // earlier registration.
        registrations.retain(|r| {
            r.event.strong_count() > 0 && !(r.owner == owner && Weak::ptr_eq(&r.event, &event))
        });
        registrations.push(Registration {
            owner,
            path,
            subtree,
            filter,
            event,
        });
    }

    /// Reports a change of `kind` at the folded path `changed`, firing and
    /// removing every matching registration. Returns how many fired.
    pub fn notify(&self, changed: &str, kind: NotifyFilter) -> usize {
        self.fire(|r| r.matches(changed, kind))
    }

    /// Fires every registration at or below the folded path `removed`,
    /// whatever its filter. Used when a subtree is deleted.
    pub fn notify_removed(&self, removed: &str) -> usize {
        self.fire(|r| path::is_within(&r.path, removed))
    }

    fn fire(&self, mut pred: impl FnMut(&Registration) -> bool) -> usize {
        let mut fired = Vec::new();
        self.lock().retain(|r| {
            if r.event.strong_count() == 0 {
                return false;
            }
            if pred(r) {
                fired.push(r.event.clone());
                return false;
            }
            true
        });

        let mut count = 0;
        for event in fired {
            if let Some(event) = event.upgrade() {
                event.signal();
                count += 1;
            }
        }
        if count > 0 {
            trace!(count, "change notifications fired");
        }
        count
    }

    /// Drops the registration made through `owner` that signals `event`,
    /// however many strong references to `event` remain elsewhere.
    pub fn cancel(&self, owner: HKey, event: &Arc<WaitEvent>) {
        let event = Arc::downgrade(event);
        self.lock()
            .retain(|r| !(r.owner == owner && Weak::ptr_eq(&r.event, &event)));
    }

    /// Drops every registration made through `owner`.
    pub fn remove_owner(&self, owner: HKey) {
        self.lock().retain(|r| r.owner != owner);
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.lock()
            .iter()
            .filter(|r| r.event.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
