use serde::{Deserialize, Serialize};

use super::ReadingKind;

/// One entry of `GET /api/listar-tipos-tirada/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingType {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    /// `basica`, `claridad` or `profunda`.
    #[serde(rename = "tipo")]
    pub kind: String,
    #[serde(rename = "costo_gemas", default)]
    pub gem_cost: i64,
}

impl ReadingType {
    pub fn reading_kind(&self) -> Option<ReadingKind> {
        match self.kind.as_str() {
            "basica" => Some(ReadingKind::Basic),
            "claridad" => Some(ReadingKind::Clarity),
            "profunda" => Some(ReadingKind::Deep),
            _ => None,
        }
    }
}

/// A card as laid out in a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawnCard {
    #[serde(rename = "carta_nombre")]
    pub name: String,
    #[serde(rename = "carta_imagen", default)]
    pub image: Option<String>,
    #[serde(rename = "invertida", default)]
    pub reversed: bool,
    #[serde(rename = "significado", default)]
    pub meaning: Option<String>,
}

/// A finished reading, as returned on creation and in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "tipo_tirada_nombre", default)]
    pub type_name: String,
    #[serde(rename = "pregunta", default)]
    pub question: String,
    #[serde(rename = "cartas", default)]
    pub cards: Vec<DrawnCard>,
    #[serde(rename = "interpretacion", default)]
    pub interpretation: Option<String>,
    #[serde(rename = "interpretacion_general", default)]
    pub general_interpretation: Option<String>,
    #[serde(rename = "consejos", default)]
    pub advice: Option<String>,
    #[serde(rename = "fecha_creacion", default)]
    pub created_at: Option<String>,
}

/// Body of `POST /api/realizar-tirada/`.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingRequest<'a> {
    #[serde(rename = "tipo_tirada")]
    pub reading_type: i64,
    #[serde(rename = "pregunta")]
    pub question: &'a str,
}

/// Success body of `POST /api/realizar-tirada/`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingResult {
    #[serde(rename = "mensaje", default)]
    pub message: Option<String>,
    #[serde(rename = "tirada")]
    pub reading: Reading,
}
