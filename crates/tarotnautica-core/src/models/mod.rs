//! Wire records for the Tarotnautica API.
//!
//! - Auth: `LoginRequest`, `TokenPair`, `RefreshRequest`, `RefreshResult`,
//!   `Registration`
//! - Account: `Profile`, `GemPurchase`, `GemBalance`
//! - Readings: `ReadingType`, `Reading`, `ReadingRequest`, `ReadingResult`
//! - Spells and potions: `CatalogItem`, purchase bodies and `PurchaseOutcome`

pub mod auth;
pub mod catalog;
pub mod profile;
pub mod reading;

pub use auth::{LoginRequest, RefreshRequest, RefreshResult, Registration, RegistrationErrors, TokenPair};
pub use catalog::{
    CatalogItem, OwnedPotions, OwnedSpells, PotionPurchase, PurchaseOutcome, PurchaseReply, SpellPurchase,
};
pub use profile::{GemBalance, GemPurchase, Profile, ReadingKind};
pub use reading::{DrawnCard, Reading, ReadingRequest, ReadingResult, ReadingType};
