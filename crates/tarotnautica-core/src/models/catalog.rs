use serde::{Deserialize, Serialize};

/// A spell or potion listed by `GET /api/hechizos/` or `GET /api/pociones/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    #[serde(rename = "precio_gemas", default)]
    pub gem_price: i64,
}

/// Body of `GET /api/mis-hechizos/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnedSpells {
    #[serde(rename = "hechizos_comprados", default)]
    pub ids: Vec<i64>,
}

/// Body of `GET /api/mis-pociones/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnedPotions {
    #[serde(rename = "pociones_compradas", default)]
    pub ids: Vec<i64>,
}

/// Body of `POST /api/comprar-hechizo/`.
#[derive(Debug, Clone, Serialize)]
pub struct SpellPurchase {
    #[serde(rename = "hechizo_id")]
    pub spell_id: i64,
}

/// Body of `POST /api/comprar-pocion/`.
#[derive(Debug, Clone, Serialize)]
pub struct PotionPurchase {
    #[serde(rename = "pocion_id")]
    pub potion_id: i64,
}

/// Status the store answers with when the item is already owned.
const ALREADY_OWNED_STATUS: &str = "ya_comprado";

/// Success body of both purchase endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "mensaje", default)]
    pub message: Option<String>,
    #[serde(rename = "gemas_restantes", default)]
    pub gems_remaining: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased { gems_remaining: Option<i64> },
    /// Nothing was charged.
    AlreadyOwned { message: Option<String> },
}

impl From<PurchaseReply> for PurchaseOutcome {
    fn from(reply: PurchaseReply) -> Self {
        if reply.status.as_deref() == Some(ALREADY_OWNED_STATUS) {
            PurchaseOutcome::AlreadyOwned {
                message: reply.message,
            }
        } else {
            PurchaseOutcome::Purchased {
                gems_remaining: reply.gems_remaining,
            }
        }
    }
}
