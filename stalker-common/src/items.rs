//! Item gold valuations, read from the per-version static bundle.

use serde_json::Value;

/// Items the static data no longer describes but old timelines still
/// reference, with the gold value they had. Item 1018 was removed from the
/// catalogue while worth 2200.
const PHANTOM_ITEM_GOLD: &[(i64, i64)] = &[(1018, 2200)];

/// The item catalogue of one game version.
pub struct ItemsCatalog {
    data: Value,
}

impl ItemsCatalog {
    pub fn from_json(items_json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            data: serde_json::from_str(items_json)?,
        })
    }

    /// Total gold value of an item. Item 0 is the empty slot.
    pub fn gold_value(&self, item_id: i64) -> i64 {
        if item_id == 0 {
            return 0;
        }
        if let Some((_, gold)) = PHANTOM_ITEM_GOLD.iter().find(|(id, _)| *id == item_id) {
            return *gold;
        }
        self.data["data"][item_id.to_string()]["gold"]["total"]
            .as_i64()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> ItemsCatalog {
        ItemsCatalog {
            data: json!({
                "data": {
                    "1001": {"gold": {"total": 300}},
                    "3078": {"gold": {"total": 3733}},
                }
            }),
        }
    }

    #[test]
    fn known_items_resolve() {
        assert_eq!(catalog().gold_value(1001), 300);
        assert_eq!(catalog().gold_value(3078), 3733);
    }

    #[test]
    fn empty_slot_is_free() {
        assert_eq!(catalog().gold_value(0), 0);
    }

    #[test]
    fn phantom_items_use_the_override() {
        assert_eq!(catalog().gold_value(1018), 2200);
    }

    #[test]
    fn unknown_items_are_worthless() {
        assert_eq!(catalog().gold_value(999_999), 0);
    }
}
