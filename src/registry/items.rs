//! Item instances: room floors, player inventories, equipment slots.
//!
//! Every instance lives in exactly one place at a time; the mutating
//! methods move instances rather than copy them, so conservation holds by
//! construction. Container contents are held by the world-state registry,
//! shop stock is copied fresh from templates on purchase.

use std::collections::HashMap;

use crate::types::{ItemId, ItemSlot, RoomId, SessionId};
use crate::world::Item;

/// A live item: minted id plus a copy of the template. Only `charges`
/// changes after minting.
#[derive(Debug, Clone)]
pub struct ItemInstance {
    pub id: ItemId,
    pub item: Item,
}

impl ItemInstance {
    pub fn matches(&self, keyword: &str) -> bool {
        self.item.keyword.eq_ignore_ascii_case(keyword)
    }
}

#[derive(Default)]
pub struct ItemRegistry {
    rooms: HashMap<RoomId, Vec<ItemInstance>>,
    inventories: HashMap<SessionId, Vec<ItemInstance>>,
    equipment: HashMap<SessionId, HashMap<ItemSlot, ItemInstance>>,
    next_id: u64,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh instance from a template. The caller decides where it
    /// goes; an instance that is dropped instead is destroyed.
    pub fn mint(&mut self, template: &Item) -> ItemInstance {
        self.next_id += 1;
        ItemInstance {
            id: ItemId(self.next_id),
            item: template.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Room floors
    // -------------------------------------------------------------------------

    pub fn room_items(&self, room: &RoomId) -> &[ItemInstance] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn put_in_room(&mut self, room: RoomId, instance: ItemInstance) {
        self.rooms.entry(room).or_default().push(instance);
    }

    /// Remove the first floor item matching `keyword`.
    pub fn take_from_room(&mut self, room: &RoomId, keyword: &str) -> Option<ItemInstance> {
        let items = self.rooms.get_mut(room)?;
        let at = items.iter().position(|i| i.matches(keyword))?;
        Some(items.remove(at))
    }

    // -------------------------------------------------------------------------
    // Inventories
    // -------------------------------------------------------------------------

    pub fn inventory(&self, session: SessionId) -> &[ItemInstance] {
        self.inventories
            .get(&session)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn add_to_inventory(&mut self, session: SessionId, instance: ItemInstance) {
        self.inventories.entry(session).or_default().push(instance);
    }

    pub fn find_in_inventory(&self, session: SessionId, keyword: &str) -> Option<&ItemInstance> {
        self.inventory(session).iter().find(|i| i.matches(keyword))
    }

    pub fn inventory_item_mut(
        &mut self,
        session: SessionId,
        keyword: &str,
    ) -> Option<&mut ItemInstance> {
        self.inventories
            .get_mut(&session)?
            .iter_mut()
            .find(|i| i.matches(keyword))
    }

    /// Remove the first inventory item matching `keyword`.
    pub fn take_from_inventory(
        &mut self,
        session: SessionId,
        keyword: &str,
    ) -> Option<ItemInstance> {
        let items = self.inventories.get_mut(&session)?;
        let at = items.iter().position(|i| i.matches(keyword))?;
        Some(items.remove(at))
    }

    /// Remove the item `wear` should pick for `keyword`: wearable matches
    /// (non-null slot) win over bare matches, earliest inventory position
    /// breaking ties.
    pub fn take_wear_candidate(
        &mut self,
        session: SessionId,
        keyword: &str,
    ) -> Option<ItemInstance> {
        let items = self.inventories.get_mut(&session)?;
        let at = items
            .iter()
            .position(|i| i.matches(keyword) && i.item.slot.is_some())
            .or_else(|| items.iter().position(|i| i.matches(keyword)))?;
        Some(items.remove(at))
    }

    // -------------------------------------------------------------------------
    // Equipment
    // -------------------------------------------------------------------------

    pub fn equipped(&self, session: SessionId, slot: ItemSlot) -> Option<&ItemInstance> {
        self.equipment.get(&session)?.get(&slot)
    }

    /// All equipped items for a session in slot declaration order.
    pub fn equipment_of(&self, session: SessionId) -> Vec<(ItemSlot, &ItemInstance)> {
        let Some(slots) = self.equipment.get(&session) else {
            return Vec::new();
        };
        ItemSlot::ALL
            .iter()
            .filter_map(|slot| slots.get(slot).map(|i| (*slot, i)))
            .collect()
    }

    /// Place an instance in its slot, returning the prior occupant.
    /// Panics in debug builds if the item has no slot; callers check first.
    pub fn equip(&mut self, session: SessionId, instance: ItemInstance) -> Option<ItemInstance> {
        let slot = instance
            .item
            .slot
            .expect("equip called with a slotless item");
        self.equipment
            .entry(session)
            .or_default()
            .insert(slot, instance)
    }

    pub fn unequip(&mut self, session: SessionId, slot: ItemSlot) -> Option<ItemInstance> {
        self.equipment.get_mut(&session)?.remove(&slot)
    }

    /// First equipped item matching `keyword`, in slot declaration order.
    pub fn find_equipped(&self, session: SessionId, keyword: &str) -> Option<(ItemSlot, &ItemInstance)> {
        self.equipment_of(session)
            .into_iter()
            .find(|(_, i)| i.matches(keyword))
    }

    pub fn equipped_item_mut(
        &mut self,
        session: SessionId,
        keyword: &str,
    ) -> Option<&mut ItemInstance> {
        self.equipment
            .get_mut(&session)?
            .values_mut()
            .find(|i| i.matches(keyword))
    }

    /// Remove an equipped item by instance id, whatever slot it is in.
    pub fn unequip_by_id(&mut self, session: SessionId, id: ItemId) -> Option<ItemInstance> {
        let slots = self.equipment.get_mut(&session)?;
        let slot = slots
            .iter()
            .find_map(|(slot, i)| (i.id == id).then_some(*slot))?;
        slots.remove(&slot)
    }

    pub fn equipped_armor_total(&self, session: SessionId) -> i32 {
        self.equipment
            .get(&session)
            .map(|slots| slots.values().map(|i| i.item.armor).sum())
            .unwrap_or(0)
    }

    pub fn equipped_weapon_damage(&self, session: SessionId) -> i32 {
        self.equipped(session, ItemSlot::Weapon)
            .map(|i| i.item.damage)
            .unwrap_or(0)
    }

    // -------------------------------------------------------------------------
    // Session lifecycle
    // -------------------------------------------------------------------------

    /// Strip a session's inventory and equipment, e.g. on logout or zone
    /// handoff. Returns `(inventory, equipment)` for persistence.
    pub fn clear_session(
        &mut self,
        session: SessionId,
    ) -> (Vec<ItemInstance>, Vec<(ItemSlot, ItemInstance)>) {
        let inventory = self.inventories.remove(&session).unwrap_or_default();
        let mut equipment: Vec<(ItemSlot, ItemInstance)> = Vec::new();
        if let Some(slots) = self.equipment.remove(&session) {
            let mut slots: Vec<(ItemSlot, ItemInstance)> = slots.into_iter().collect();
            slots.sort_by_key(|(slot, _)| ItemSlot::ALL.iter().position(|s| s == slot));
            equipment = slots;
        }
        (inventory, equipment)
    }

    /// Move a session's items to a different session id (login takeover).
    pub fn rebind_session(&mut self, from: SessionId, to: SessionId) {
        if let Some(items) = self.inventories.remove(&from) {
            self.inventories.insert(to, items);
        }
        if let Some(slots) = self.equipment.remove(&from) {
            self.equipment.insert(to, slots);
        }
    }

    /// Total number of instances everywhere this registry tracks.
    pub fn instance_count(&self) -> usize {
        let on_floors: usize = self.rooms.values().map(Vec::len).sum();
        let in_bags: usize = self.inventories.values().map(Vec::len).sum();
        let worn: usize = self.equipment.values().map(HashMap::len).sum();
        on_floors + in_bags + worn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(keyword: &str, slot: Option<ItemSlot>, armor: i32) -> Item {
        Item {
            keyword: keyword.into(),
            display_name: format!("a {}", keyword),
            slot,
            armor,
            damage: 0,
            consumable: false,
            charges: 0,
            base_price: 1,
            on_use: vec![],
        }
    }

    fn rid(s: &str) -> RoomId {
        s.parse().unwrap()
    }

    #[test]
    fn floor_to_inventory_preserves_identity() {
        let mut reg = ItemRegistry::new();
        let room = rid("town:square");
        let cap = reg.mint(&template("cap", Some(ItemSlot::Head), 1));
        let minted_id = cap.id;
        reg.put_in_room(room.clone(), cap);

        let taken = reg.take_from_room(&room, "CAP").unwrap();
        assert_eq!(taken.id, minted_id);
        reg.add_to_inventory(SessionId(1), taken);

        assert!(reg.room_items(&room).is_empty());
        assert_eq!(reg.inventory(SessionId(1)).len(), 1);
        assert_eq!(reg.instance_count(), 1);
    }

    #[test]
    fn equip_returns_prior_occupant() {
        let mut reg = ItemRegistry::new();
        let sid = SessionId(1);
        let cap = reg.mint(&template("cap", Some(ItemSlot::Head), 1));
        let helm = reg.mint(&template("helm", Some(ItemSlot::Head), 3));

        assert!(reg.equip(sid, cap).is_none());
        let prior = reg.equip(sid, helm).unwrap();
        assert!(prior.matches("cap"));
        assert_eq!(reg.equipped_armor_total(sid), 3);
    }

    #[test]
    fn wear_candidate_prefers_wearables() {
        let mut reg = ItemRegistry::new();
        let sid = SessionId(1);
        // A slotless "cap" trinket sits before the wearable one.
        let trinket = reg.mint(&template("cap", None, 0));
        reg.add_to_inventory(sid, trinket);
        let wearable = reg.mint(&template("cap", Some(ItemSlot::Head), 1));
        let wearable_id = wearable.id;
        reg.add_to_inventory(sid, wearable);

        let picked = reg.take_wear_candidate(sid, "cap").unwrap();
        assert_eq!(picked.id, wearable_id);
        // Only the trinket remains.
        assert_eq!(reg.inventory(sid).len(), 1);
    }

    #[test]
    fn clear_session_returns_everything_once() {
        let mut reg = ItemRegistry::new();
        let sid = SessionId(1);
        let sword = reg.mint(&template("sword", Some(ItemSlot::Weapon), 0));
        reg.equip(sid, sword);
        let bread = reg.mint(&template("bread", None, 0));
        reg.add_to_inventory(sid, bread);

        let (inventory, equipment) = reg.clear_session(sid);
        assert_eq!(inventory.len(), 1);
        assert_eq!(equipment.len(), 1);
        assert_eq!(reg.instance_count(), 0);
    }

    #[test]
    fn unequip_by_id_finds_the_slot() {
        let mut reg = ItemRegistry::new();
        let sid = SessionId(1);
        let cap = reg.mint(&template("cap", Some(ItemSlot::Head), 1));
        let cap_id = cap.id;
        reg.equip(sid, cap);
        let removed = reg.unequip_by_id(sid, cap_id).unwrap();
        assert_eq!(removed.id, cap_id);
        assert!(reg.equipped(sid, ItemSlot::Head).is_none());
    }
}
