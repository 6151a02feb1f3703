//! Player groups (parties): invites, roster, leadership.
//!
//! Groups are transient; they exist only while members are online and are
//! never persisted. XP sharing policy lives in `progression`; chat fan-out
//! in the group handler.

use std::collections::{HashMap, HashSet};

use crate::types::{GroupId, SessionId};

#[derive(Debug)]
pub struct Group {
    pub id: GroupId,
    pub leader: SessionId,
    /// Join order; the roster display and gtell fan-out follow it.
    pub members: Vec<SessionId>,
    /// Lowercased names invited but not yet accepted.
    pub pending_invites: HashSet<String>,
}

#[derive(Default)]
pub struct GroupSystem {
    groups: HashMap<GroupId, Group>,
    next_id: u64,
}

impl GroupSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, leader: SessionId) -> GroupId {
        self.next_id += 1;
        let id = GroupId(self.next_id);
        self.groups.insert(
            id,
            Group {
                id,
                leader,
                members: vec![leader],
                pending_invites: HashSet::new(),
            },
        );
        id
    }

    pub fn get(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn get_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(&id)
    }

    pub fn invite(&mut self, id: GroupId, name: &str) -> bool {
        match self.groups.get_mut(&id) {
            Some(group) => group.pending_invites.insert(name.to_lowercase()),
            None => false,
        }
    }

    /// The group holding a pending invite for `name`, if any.
    pub fn find_invite(&self, name: &str) -> Option<GroupId> {
        let needle = name.to_lowercase();
        let mut candidates: Vec<&Group> = self
            .groups
            .values()
            .filter(|g| g.pending_invites.contains(&needle))
            .collect();
        candidates.sort_by_key(|g| g.id.0);
        candidates.first().map(|g| g.id)
    }

    /// Consume a pending invite and add the session to the roster.
    pub fn accept(&mut self, id: GroupId, name: &str, session: SessionId) -> bool {
        let Some(group) = self.groups.get_mut(&id) else {
            return false;
        };
        if !group.pending_invites.remove(&name.to_lowercase()) {
            return false;
        }
        group.members.push(session);
        true
    }

    pub fn decline(&mut self, id: GroupId, name: &str) -> bool {
        match self.groups.get_mut(&id) {
            Some(group) => group.pending_invites.remove(&name.to_lowercase()),
            None => false,
        }
    }

    /// Remove a member. The group dissolves when empty; leadership passes
    /// to the earliest remaining member when the leader leaves. Returns the
    /// new leader if leadership changed.
    pub fn remove_member(&mut self, id: GroupId, session: SessionId) -> Option<SessionId> {
        let Some(group) = self.groups.get_mut(&id) else {
            return None;
        };
        group.members.retain(|m| *m != session);
        if group.members.is_empty() {
            self.groups.remove(&id);
            return None;
        }
        if group.leader == session {
            group.leader = group.members[0];
            return Some(group.leader);
        }
        None
    }

    pub fn members(&self, id: GroupId) -> Vec<SessionId> {
        self.groups
            .get(&id)
            .map(|g| g.members.clone())
            .unwrap_or_default()
    }

    pub fn is_leader(&self, id: GroupId, session: SessionId) -> bool {
        self.groups.get(&id).map(|g| g.leader == session).unwrap_or(false)
    }

    /// Rewrite a session id after a login takeover.
    pub fn rebind_session(&mut self, from: SessionId, to: SessionId) {
        for group in self.groups.values_mut() {
            if group.leader == from {
                group.leader = to;
            }
            for member in group.members.iter_mut() {
                if *member == from {
                    *member = to;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_accept_flow() {
        let mut groups = GroupSystem::new();
        let id = groups.create(SessionId(1));
        assert!(groups.invite(id, "Bob"));
        assert_eq!(groups.find_invite("bob"), Some(id));
        assert!(groups.accept(id, "BOB", SessionId(2)));
        assert_eq!(groups.members(id), vec![SessionId(1), SessionId(2)]);
        // Invite is consumed.
        assert_eq!(groups.find_invite("bob"), None);
    }

    #[test]
    fn accept_without_invite_fails() {
        let mut groups = GroupSystem::new();
        let id = groups.create(SessionId(1));
        assert!(!groups.accept(id, "Mallory", SessionId(3)));
        assert_eq!(groups.members(id).len(), 1);
    }

    #[test]
    fn leadership_passes_then_group_dissolves() {
        let mut groups = GroupSystem::new();
        let id = groups.create(SessionId(1));
        groups.invite(id, "Bob");
        groups.accept(id, "Bob", SessionId(2));

        let new_leader = groups.remove_member(id, SessionId(1));
        assert_eq!(new_leader, Some(SessionId(2)));
        assert!(groups.is_leader(id, SessionId(2)));

        assert_eq!(groups.remove_member(id, SessionId(2)), None);
        assert!(groups.get(id).is_none());
    }

    #[test]
    fn decline_clears_the_invite() {
        let mut groups = GroupSystem::new();
        let id = groups.create(SessionId(1));
        groups.invite(id, "Bob");
        assert!(groups.decline(id, "bob"));
        assert_eq!(groups.find_invite("bob"), None);
    }
}
