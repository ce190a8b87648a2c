//! Inventory item wrappers.
//!
//! The host reports an item's concrete class name; [`ItemKind::classify`] maps it through
//! [`ITEM_TABLE`] once, at proxy creation. Throwables are split further by the projectile they
//! spawn. New categories are added by extending the enum and the table.

use std::{fmt, str::FromStr};

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::proxy::cache::{HostCategory, Proxy, ProxyCache, ProxyKind};

/// Projectile spawned by a throwable item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
pub enum ProjectileKind {
    /// Flash grenade
    #[strum(serialize = "FlashbangGrenade")]
    Flash,
    /// Fragmentation grenade
    #[strum(serialize = "ExplosionGrenade")]
    Explosive,
    /// Any other projectile
    #[strum(serialize = "Projectile")]
    Other,
}

/// Wrapper variant for an inventory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// Firearm
    Firearm,
    /// Keycard
    Keycard,
    /// Consumable (medkits, SCP items)
    Usable,
    /// Radio
    Radio,
    /// Micro H.I.D.
    MicroHid,
    /// Body armor
    Armor,
    /// Ammunition box
    Ammo,
    /// Throwable, split by projectile
    Throwable(ProjectileKind),
    /// Any item the table does not know
    Generic,
}

/// Host class name to wrapper variant.
///
/// `ThrowableItem` maps to `Throwable(Other)`; the projectile is refined in
/// [`ItemKind::classify`].
pub const ITEM_TABLE: &[(&str, ItemKind)] = &[
    ("InventorySystem.Items.Firearms.Firearm", ItemKind::Firearm),
    ("InventorySystem.Items.Keycards.KeycardItem", ItemKind::Keycard),
    ("InventorySystem.Items.Usables.UsableItem", ItemKind::Usable),
    ("InventorySystem.Items.Radio.RadioItem", ItemKind::Radio),
    ("InventorySystem.Items.MicroHID.MicroHIDItem", ItemKind::MicroHid),
    ("InventorySystem.Items.Armor.BodyArmor", ItemKind::Armor),
    ("InventorySystem.Items.Firearms.Ammo.AmmoItem", ItemKind::Ammo),
    (
        "InventorySystem.Items.ThrowableProjectiles.ThrowableItem",
        ItemKind::Throwable(ProjectileKind::Other),
    ),
];

impl ItemKind {
    /// Returns true for throwables of any projectile.
    #[must_use]
    pub fn is_throwable(&self) -> bool {
        matches!(self, ItemKind::Throwable(_))
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Firearm => f.write_str("Firearm"),
            ItemKind::Keycard => f.write_str("Keycard"),
            ItemKind::Usable => f.write_str("Usable"),
            ItemKind::Radio => f.write_str("Radio"),
            ItemKind::MicroHid => f.write_str("MicroHid"),
            ItemKind::Armor => f.write_str("Armor"),
            ItemKind::Ammo => f.write_str("Ammo"),
            ItemKind::Throwable(projectile) => write!(f, "Throwable<{projectile}>"),
            ItemKind::Generic => f.write_str("Generic"),
        }
    }
}

impl ProxyKind for ItemKind {
    fn classify(category: &HostCategory) -> Option<Self> {
        let (_, kind) = ITEM_TABLE
            .iter()
            .find(|(name, _)| *name == category.name())?;

        match kind {
            ItemKind::Throwable(_) => Some(ItemKind::Throwable(
                category
                    .projectile()
                    .and_then(|p| ProjectileKind::from_str(short_name(p)).ok())
                    .unwrap_or(ProjectileKind::Other),
            )),
            other => Some(*other),
        }
    }

    fn generic() -> Self {
        ItemKind::Generic
    }
}

fn short_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Wrapper around a host inventory item.
pub type ItemProxy = Proxy<ItemKind>;

/// Cache of item wrappers.
pub type ItemCache = ProxyCache<ItemKind>;
