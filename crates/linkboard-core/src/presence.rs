//! Connected collaborators and their live cursors.

use crate::sync::{Collaborator, CursorPosition};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Collaborators on a board, keyed by relay session id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    members: BTreeMap<String, Collaborator>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole roster, keeping cursors for members that stay.
    pub fn replace(&mut self, members: Vec<Collaborator>) {
        let mut next = BTreeMap::new();
        for mut member in members {
            if member.cursor.is_none() {
                member.cursor = self.members.get(&member.session_id).and_then(|m| m.cursor);
            }
            next.insert(member.session_id.clone(), member);
        }
        self.members = next;
    }

    /// Update a member's cursor. Returns false for unknown sessions.
    pub fn update_cursor(&mut self, session_id: &str, cursor: CursorPosition) -> bool {
        match self.members.get_mut(session_id) {
            Some(member) => {
                member.cursor = Some(cursor);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, session_id: &str) -> Option<Collaborator> {
        self.members.remove(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<&Collaborator> {
        self.members.get(session_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Collaborator> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    pub fn to_vec(&self) -> Vec<Collaborator> {
        self.members.values().cloned().collect()
    }
}

/// Rate limit for outgoing cursor updates.
#[derive(Debug, Clone)]
pub struct PresenceThrottle {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl PresenceThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_sent: None }
    }

    /// Whether an update may go out at `now`. Records the send when it may.
    pub fn should_send(&mut self, now: Instant) -> bool {
        let due = self
            .last_sent
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_sent = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::UserInfo;

    fn member(id: &str) -> Collaborator {
        Collaborator {
            session_id: id.to_string(),
            user: UserInfo {
                name: id.to_uppercase(),
                color: "#3366ff".to_string(),
            },
            cursor: None,
        }
    }

    #[test]
    fn test_replace_keeps_known_cursors() {
        let mut roster = Roster::new();
        roster.replace(vec![member("a"), member("b")]);
        assert!(roster.update_cursor("a", CursorPosition { x: 1.0, y: 2.0 }));
        roster.replace(vec![member("a"), member("c")]);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.get("a").and_then(|m| m.cursor), Some(CursorPosition { x: 1.0, y: 2.0 }));
        assert!(roster.get("b").is_none());
    }

    #[test]
    fn test_unknown_cursor_ignored() {
        let mut roster = Roster::new();
        assert!(!roster.update_cursor("ghost", CursorPosition { x: 0.0, y: 0.0 }));
        assert!(roster.is_empty());
    }

    #[test]
    fn test_throttle() {
        let mut throttle = PresenceThrottle::new(Duration::from_millis(50));
        let t0 = Instant::now();
        assert!(throttle.should_send(t0));
        assert!(!throttle.should_send(t0 + Duration::from_millis(10)));
        assert!(throttle.should_send(t0 + Duration::from_millis(50)));
        throttle.reset();
        assert!(throttle.should_send(t0 + Duration::from_millis(51)));
    }
}
