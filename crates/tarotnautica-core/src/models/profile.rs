use serde::{Deserialize, Serialize};

/// Readings included per subscription period.
const BASIC_READING_LIMIT: u32 = 100;
const CLARITY_READING_LIMIT: u32 = 50;
const DEEP_READING_LIMIT: u32 = 30;

/// Reading spreads offered by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingKind {
    Basic,
    Clarity,
    Deep,
}

impl ReadingKind {
    pub fn subscription_limit(&self) -> u32 {
        match self {
            ReadingKind::Basic => BASIC_READING_LIMIT,
            ReadingKind::Clarity => CLARITY_READING_LIMIT,
            ReadingKind::Deep => DEEP_READING_LIMIT,
        }
    }
}

/// Body of `GET /api/perfil/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "gemas")]
    pub gems: i64,
    #[serde(rename = "tiene_suscripcion", default)]
    pub has_subscription: bool,
    #[serde(rename = "tiradas_basicas_usadas", default)]
    pub basic_readings_used: u32,
    #[serde(rename = "tiradas_claridad_usadas", default)]
    pub clarity_readings_used: u32,
    #[serde(rename = "tiradas_profundas_usadas", default)]
    pub deep_readings_used: u32,
}

impl Profile {
    pub fn readings_used(&self, kind: ReadingKind) -> u32 {
        match kind {
            ReadingKind::Basic => self.basic_readings_used,
            ReadingKind::Clarity => self.clarity_readings_used,
            ReadingKind::Deep => self.deep_readings_used,
        }
    }

    /// Readings left in the subscription; zero without a subscription.
    pub fn readings_remaining(&self, kind: ReadingKind) -> u32 {
        if !self.has_subscription {
            return 0;
        }
        kind.subscription_limit().saturating_sub(self.readings_used(kind))
    }
}

/// Body of `POST /api/comprar-gemas/`.
#[derive(Debug, Clone, Serialize)]
pub struct GemPurchase {
    #[serde(rename = "cantidad")]
    pub amount: u32,
}

/// Success body of `POST /api/comprar-gemas/`: the new balance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GemBalance {
    #[serde(rename = "gemas")]
    pub gems: i64,
}
