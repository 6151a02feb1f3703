//! XP curve and level-ups.
//!
//! The cost to advance from level `n` to `n + 1` is `xp_step * n`, so the
//! per-level cost is strictly increasing. One grant can cross several
//! thresholds at once.

use crate::config::ProgressionConfig;
use crate::registry::PlayerState;

pub struct PlayerProgression {
    max_level: u32,
    xp_step: u64,
}

impl PlayerProgression {
    pub fn new(config: ProgressionConfig) -> Self {
        Self {
            max_level: config.max_level,
            xp_step: config.xp_step,
        }
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// XP needed to advance from `level` to `level + 1`.
    pub fn xp_for_level(&self, level: u32) -> u64 {
        self.xp_step * level as u64
    }

    /// Total XP at which `level` is reached.
    pub fn total_xp_for_level(&self, level: u32) -> u64 {
        let n = level.max(1) as u64 - 1;
        self.xp_step * n * (n + 1) / 2
    }

    /// The level a running XP total corresponds to, capped at `max_level`.
    pub fn level_for_total_xp(&self, xp_total: u64) -> u32 {
        let mut level = 1;
        while level < self.max_level && xp_total >= self.total_xp_for_level(level + 1) {
            level += 1;
        }
        level
    }

    /// Add XP and apply any level-ups. Returns the number of levels gained.
    pub fn grant(&self, player: &mut PlayerState, amount: u64) -> u32 {
        player.xp_total = player.xp_total.saturating_add(amount);
        let new_level = self.level_for_total_xp(player.xp_total);
        let gained = new_level.saturating_sub(player.level);
        player.level = new_level.max(player.level);
        gained
    }

    /// Split `total` XP between `member_count` eligible members: everyone
    /// gets the floor share, the killer additionally keeps the remainder.
    pub fn group_shares(total: u64, member_count: u64) -> (u64, u64) {
        if member_count == 0 {
            return (0, total);
        }
        let share = total / member_count;
        let remainder = total - share * member_count;
        (share, remainder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BASE_MAX_HP;
    use crate::types::SessionId;

    fn progression() -> PlayerProgression {
        PlayerProgression::new(ProgressionConfig {
            max_level: 10,
            xp_step: 100,
        })
    }

    fn player() -> PlayerState {
        let mut p = test_player_state();
        p.level = 1;
        p.xp_total = 0;
        p
    }

    fn test_player_state() -> PlayerState {
        PlayerState {
            name: "Alice".into(),
            session: SessionId(1),
            room: "town:square".parse().unwrap(),
            hp: BASE_MAX_HP,
            max_hp: BASE_MAX_HP,
            base_max_hp: BASE_MAX_HP,
            level: 1,
            xp_total: 0,
            gold: 0,
            is_staff: false,
            guild_id: None,
            guild_rank: None,
            group_id: None,
            recall_room: None,
            recall_ready_at_ms: 0,
            inbox: Vec::new(),
            mail_compose: None,
            dialogue: None,
            prompt_format: None,
            login_seq: 0,
        }
    }

    #[test]
    fn thresholds_are_cumulative() {
        let p = progression();
        assert_eq!(p.total_xp_for_level(1), 0);
        assert_eq!(p.total_xp_for_level(2), 100);
        assert_eq!(p.total_xp_for_level(3), 300);
        assert_eq!(p.total_xp_for_level(4), 600);
    }

    #[test]
    fn grant_can_cross_multiple_levels() {
        let prog = progression();
        let mut player = player();
        let gained = prog.grant(&mut player, 350);
        assert_eq!(gained, 2);
        assert_eq!(player.level, 3);
        assert_eq!(player.xp_total, 350);
    }

    #[test]
    fn level_caps_at_max() {
        let prog = progression();
        let mut player = player();
        prog.grant(&mut player, 1_000_000);
        assert_eq!(player.level, 10);
    }

    #[test]
    fn group_shares_floor_with_remainder() {
        assert_eq!(PlayerProgression::group_shares(100, 3), (33, 1));
        assert_eq!(PlayerProgression::group_shares(100, 1), (100, 0));
        assert_eq!(PlayerProgression::group_shares(0, 3), (0, 0));
    }
}
