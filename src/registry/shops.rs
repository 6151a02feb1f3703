//! Shop lookup and the buy/sell price rules.
//!
//! Shop stock is unlimited template stock: buying mints a fresh instance,
//! selling destroys one. Prices derive from `base_price` and the economy
//! multipliers, rounded half-to-even.

use crate::config::EconomyConfig;
use crate::types::RoomId;
use crate::world::{Item, ShopDef, World};

/// Round to the nearest integer, ties to even.
fn round_half_even(value: f64) -> u64 {
    let floor = value.floor();
    let frac = value - floor;
    let floor_int = floor as u64;
    if frac > 0.5 {
        floor_int + 1
    } else if frac < 0.5 {
        floor_int
    } else if floor_int % 2 == 0 {
        floor_int
    } else {
        floor_int + 1
    }
}

pub struct ShopRegistry {
    economy: EconomyConfig,
}

impl ShopRegistry {
    pub fn new(economy: EconomyConfig) -> Self {
        Self { economy }
    }

    pub fn shop_in<'w>(&self, world: &'w World, room: &RoomId) -> Option<&'w ShopDef> {
        world.shop_in(room)
    }

    pub fn buy_price(&self, item: &Item) -> u64 {
        round_half_even(item.base_price as f64 * self.economy.buy_multiplier)
    }

    /// `None` means the item is worthless and cannot be sold.
    pub fn sell_price(&self, item: &Item) -> Option<u64> {
        if item.base_price == 0 {
            return None;
        }
        let price = round_half_even(item.base_price as f64 * self.economy.sell_multiplier);
        (price > 0).then_some(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemSlot;

    fn item(base_price: u64) -> Item {
        Item {
            keyword: "sword".into(),
            display_name: "a short sword".into(),
            slot: Some(ItemSlot::Weapon),
            armor: 0,
            damage: 3,
            consumable: false,
            charges: 0,
            base_price,
            on_use: vec![],
        }
    }

    #[test]
    fn default_multipliers() {
        let shops = ShopRegistry::new(EconomyConfig::default());
        assert_eq!(shops.buy_price(&item(50)), 50);
        assert_eq!(shops.sell_price(&item(50)), Some(25));
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_half_even(2.5), 2);
        assert_eq!(round_half_even(3.5), 4);
        assert_eq!(round_half_even(2.4), 2);
        assert_eq!(round_half_even(2.6), 3);

        let shops = ShopRegistry::new(EconomyConfig {
            buy_multiplier: 1.0,
            sell_multiplier: 0.5,
        });
        // 5 * 0.5 = 2.5 rounds to 2, 7 * 0.5 = 3.5 rounds to 4.
        assert_eq!(shops.sell_price(&item(5)), Some(2));
        assert_eq!(shops.sell_price(&item(7)), Some(4));
    }

    #[test]
    fn worthless_items_cannot_be_sold() {
        let shops = ShopRegistry::new(EconomyConfig::default());
        assert_eq!(shops.sell_price(&item(0)), None);

        let shops = ShopRegistry::new(EconomyConfig {
            buy_multiplier: 1.0,
            sell_multiplier: 0.1,
        });
        // 1 * 0.1 rounds to 0: worthless.
        assert_eq!(shops.sell_price(&item(1)), None);
    }
}
