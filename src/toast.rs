use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

pub const PAGE_TOAST_DURATION: Duration = Duration::from_millis(3000);
pub const REVIEW_TOAST_DURATION: Duration = Duration::from_millis(1800);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub text: String,
    pub expires_at: Instant,
}

/// Transient notifications with a fixed lifetime.
#[derive(Debug)]
pub struct Toasts {
    duration: Duration,
    shown: VecDeque<Toast>,
    unseen: usize,
}

impl Toasts {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            shown: VecDeque::new(),
            unseen: 0,
        }
    }

    pub fn push(&mut self, text: impl Into<String>) {
        self.push_at(text, Instant::now());
    }

    pub fn push_at(&mut self, text: impl Into<String>, now: Instant) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.shown.push_back(Toast {
            text,
            expires_at: now + self.duration,
        });
        self.unseen += 1;
    }

    /// Toasts still on screen at `now`; expired ones are dropped.
    pub fn visible(&mut self, now: Instant) -> impl Iterator<Item = &Toast> {
        self.prune(now);
        self.shown.iter()
    }

    /// Texts pushed since the last call, oldest first.
    pub fn take_new(&mut self) -> Vec<String> {
        self.take_new_at(Instant::now())
    }

    /// Like [`Toasts::take_new`]; toasts expired at `now` are released once drained.
    pub fn take_new_at(&mut self, now: Instant) -> Vec<String> {
        let start = self.shown.len() - self.unseen.min(self.shown.len());
        let fresh = self.shown.iter().skip(start).map(|toast| toast.text.clone()).collect();
        self.unseen = 0;
        self.prune(now);
        fresh
    }

    fn prune(&mut self, now: Instant) {
        while self.shown.front().is_some_and(|toast| toast.expires_at <= now) {
            self.shown.pop_front();
        }
        self.unseen = self.unseen.min(self.shown.len());
    }

    pub fn latest(&self) -> Option<&str> {
        self.shown.back().map(|toast| toast.text.as_str())
    }
}

impl Default for Toasts {
    fn default() -> Self {
        Self::new(PAGE_TOAST_DURATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toasts_expire_after_duration() {
        let now = Instant::now();
        let mut toasts = Toasts::new(Duration::from_secs(3));
        toasts.push_at("saved", now);
        assert_eq!(toasts.visible(now + Duration::from_secs(2)).count(), 1);
        assert_eq!(toasts.visible(now + Duration::from_secs(3)).count(), 0);
    }

    #[test]
    fn take_new_only_returns_unseen() {
        let mut toasts = Toasts::default();
        toasts.push("one");
        toasts.push("two");
        assert_eq!(toasts.take_new(), vec!["one", "two"]);
        toasts.push("three");
        assert_eq!(toasts.take_new(), vec!["three"]);
        assert!(toasts.take_new().is_empty());
        assert_eq!(toasts.latest(), Some("three"));
    }

    #[test]
    fn draining_releases_expired_toasts() {
        let now = Instant::now();
        let mut toasts = Toasts::new(Duration::from_secs(3));
        for n in 0..100 {
            toasts.push_at(format!("event {n}"), now);
        }
        assert_eq!(toasts.take_new_at(now + Duration::from_secs(4)).len(), 100);
        assert!(toasts.latest().is_none());

        toasts.push_at("fresh", now + Duration::from_secs(5));
        assert_eq!(toasts.take_new_at(now + Duration::from_secs(6)), vec!["fresh"]);
        assert_eq!(toasts.latest(), Some("fresh"));
    }

    #[test]
    fn empty_text_is_ignored() {
        let mut toasts = Toasts::default();
        toasts.push("");
        assert!(toasts.latest().is_none());
    }
}
