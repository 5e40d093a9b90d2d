use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::store::CandidateMatch;

const SESSION_TTL: Duration = Duration::from_secs(30 * 60);
const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, Clone)]
struct SessionEntry {
    player: CandidateMatch,
    updated_at: SystemTime,
}

/// Process-wide memory of the last player each session resolved, used
/// for pronoun references. Entries expire after 30 minutes and are
/// evicted lazily on read. Caller-supplied session ids are trusted
/// as-is, truncated to 128 characters.
#[derive(Default)]
pub struct SessionMemory {
    entries: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<CandidateMatch> {
        self.get_at(session_id, SystemTime::now())
    }

    pub fn set(&self, session_id: &str, player: &CandidateMatch) {
        self.set_at(session_id, player, SystemTime::now());
    }

    pub fn get_at(&self, session_id: &str, now: SystemTime) -> Option<CandidateMatch> {
        let key = session_key(session_id)?;
        let mut entries = self.entries.lock().expect("session memory lock poisoned");
        let expired = entries.get(&key).is_some_and(|entry| {
            now.duration_since(entry.updated_at)
                .map(|age| age > SESSION_TTL)
                .unwrap_or(false)
        });
        if expired {
            entries.remove(&key);
            return None;
        }
        entries.get(&key).map(|entry| entry.player.clone())
    }

    pub fn set_at(&self, session_id: &str, player: &CandidateMatch, now: SystemTime) {
        if player.unique_id.is_empty() {
            return;
        }
        let Some(key) = session_key(session_id) else {
            return;
        };
        let mut entries = self.entries.lock().expect("session memory lock poisoned");
        entries.insert(
            key,
            SessionEntry {
                player: player.clone(),
                updated_at: now,
            },
        );
    }
}

fn session_key(session_id: &str) -> Option<String> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_SESSION_ID_LEN).collect())
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::SessionMemory;
    use crate::store::CandidateMatch;

    fn player(id: &str) -> CandidateMatch {
        CandidateMatch {
            unique_id: id.to_string(),
            name: "Test Player".to_string(),
            team: None,
            position: None,
            class: None,
            league: None,
            similarity_score: None,
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let memory = SessionMemory::new();
        let now = SystemTime::now();
        memory.set_at("session-1", &player("p1"), now);
        let got = memory.get_at("session-1", now).expect("entry should exist");
        assert_eq!(got.unique_id, "p1");
    }

    #[test]
    fn entries_expire_after_ttl() {
        let memory = SessionMemory::new();
        let now = SystemTime::now();
        memory.set_at("session-1", &player("p1"), now);
        let later = now + Duration::from_secs(30 * 60 + 1);
        assert!(memory.get_at("session-1", later).is_none());
        // Lazy eviction removed the entry entirely.
        assert!(memory.get_at("session-1", now).is_none());
    }

    #[test]
    fn players_without_ids_are_not_stored() {
        let memory = SessionMemory::new();
        let now = SystemTime::now();
        memory.set_at("session-1", &player(""), now);
        assert!(memory.get_at("session-1", now).is_none());
    }

    #[test]
    fn long_session_ids_are_truncated_to_one_key() {
        let memory = SessionMemory::new();
        let now = SystemTime::now();
        let long_a = "a".repeat(200);
        let long_b = format!("{}suffix", "a".repeat(128));
        memory.set_at(&long_a, &player("p1"), now);
        assert!(memory.get_at(&long_b, now).is_some());
    }
}
