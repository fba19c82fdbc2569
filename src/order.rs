//! Typed order model.
//!
//! The HTTP layer speaks strings (`"milk_extra"`, `"Double"`, ...); those
//! spellings are pinned here as serde attrs so string parsing happens only
//! at the JSON boundary. Everything past [`crate::api::decode_order`] is a
//! plain `Copy` enum.

use serde::{Deserialize, Serialize};

/// The four things this machine knows how to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipe {
    /// Ground coffee + sugar, brewed on water or milk, cup warmer finish.
    Coffee,
    /// Hot water or hot milk with sugar.
    HotDrink,
    /// Instant coffee with a water/milk ratio.
    Instant,
    /// Line flush; no solids, no heat, no mixing.
    Clean,
}

/// Cup size. Scales solids and pump durations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Size {
    #[default]
    Single,
    Double,
}

impl Size {
    pub const fn multiplier(self) -> u64 {
        match self {
            Self::Single => 1,
            Self::Double => 2,
        }
    }
}

/// Sugar level. Scales the sugar tank dispense time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sugar {
    #[default]
    Low,
    Medium,
    High,
}

impl Sugar {
    pub const fn multiplier(self) -> u64 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 4,
        }
    }
}

/// Brew liquid for [`Recipe::Coffee`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrewBase {
    #[default]
    Water,
    Milk,
}

/// Liquid selection for [`Recipe::HotDrink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotLiquid {
    #[default]
    Water,
    MilkMedium,
    /// Doubles the milk pump time — the "extra milk" intensifier.
    MilkExtra,
}

/// Water/milk ratio for [`Recipe::Instant`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilkRatio {
    #[default]
    None,
    /// 75% water / 25% milk.
    Medium,
    /// 50% water / 50% milk.
    Extra,
}

/// A complete drink request as submitted to the controller.
///
/// Recipe-specific fields are ignored by the other recipes; `Clean` ignores
/// size and sugar entirely. All fields except `recipe` default so a JSON
/// order only has to name what it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderParams {
    pub recipe: Recipe,
    #[serde(default)]
    pub size: Size,
    #[serde(default)]
    pub sugar: Sugar,

    // Coffee
    #[serde(default)]
    pub brew_base: BrewBase,

    // HotDrink
    #[serde(default)]
    pub hot_liquid: HotLiquid,

    // Instant
    #[serde(default)]
    pub milk_ratio: MilkRatio,

    // Clean
    #[serde(default)]
    pub clean_water: bool,
    #[serde(default)]
    pub clean_milk: bool,
}

impl OrderParams {
    /// Convenience constructor with recipe defaults; tests and the sim
    /// binary tweak fields from here.
    pub fn new(recipe: Recipe) -> Self {
        Self {
            recipe,
            size: Size::default(),
            sugar: Sugar::default(),
            brew_base: BrewBase::default(),
            hot_liquid: HotLiquid::default(),
            milk_ratio: MilkRatio::default(),
            clean_water: false,
            clean_milk: false,
        }
    }
}
