use std::collections::HashMap;

use crate::events::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Ringing,
    Connected,
}

/// Live call attempts keyed by `(caller, callee)`. Ended calls are removed.
#[derive(Debug, Default)]
pub struct CallTable {
    calls: HashMap<(UserId, UserId), CallState>,
}

fn key(caller: &str, callee: &str) -> (UserId, UserId) {
    (caller.to_string(), callee.to_string())
}

impl CallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) a ringing call from `caller` to `callee`.
    pub fn ring(&mut self, caller: &str, callee: &str) {
        self.calls.remove(&key(callee, caller));
        self.calls.insert(key(caller, callee), CallState::Ringing);
    }

    /// `callee` answers a ringing call placed by `caller`.
    pub fn accept(&mut self, callee: &str, caller: &str) -> bool {
        match self.calls.get_mut(&key(caller, callee)) {
            Some(state) if *state == CallState::Ringing => {
                *state = CallState::Connected;
                true
            }
            _ => false,
        }
    }

    /// `callee` declines a ringing call placed by `caller`.
    pub fn reject(&mut self, callee: &str, caller: &str) -> bool {
        let k = key(caller, callee);
        if self.calls.get(&k) == Some(&CallState::Ringing) {
            self.calls.remove(&k);
            return true;
        }
        false
    }

    /// Either party hangs up, whatever the state.
    pub fn end(&mut self, user: &str, other: &str) -> bool {
        let forward = self.calls.remove(&key(user, other)).is_some();
        let backward = self.calls.remove(&key(other, user)).is_some();
        forward || backward
    }

    pub fn state(&self, a: &str, b: &str) -> Option<CallState> {
        self.calls
            .get(&key(a, b))
            .or_else(|| self.calls.get(&key(b, a)))
            .copied()
    }

    pub fn is_connected(&self, a: &str, b: &str) -> bool {
        self.state(a, b) == Some(CallState::Connected)
    }

    /// Ends every call involving `user` and returns the partners left behind.
    pub fn detach(&mut self, user: &str) -> Vec<UserId> {
        let mut partners = Vec::new();
        self.calls.retain(|(caller, callee), _| {
            if caller == user {
                partners.push(callee.clone());
                false
            } else if callee == user {
                partners.push(caller.clone());
                false
            } else {
                true
            }
        });
        partners.sort();
        partners.dedup();
        partners
    }

    #[cfg(test)]
    pub fn active_calls(&self) -> usize {
        self.calls.len()
    }
}
