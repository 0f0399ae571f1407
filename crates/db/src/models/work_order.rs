use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// One of the two work-order collections tracked by the dashboard.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Dataset {
    Clinical,
    Building,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Clinical, Dataset::Building];

    /// Remote table backing this dataset.
    pub fn table(&self) -> &'static str {
        match self {
            Dataset::Clinical => "maintenance_orders",
            Dataset::Building => "building_orders",
        }
    }

    /// Human label used in progress messages.
    pub fn label(&self) -> &'static str {
        match self {
            Dataset::Clinical => "clinical",
            Dataset::Building => "building",
        }
    }
}

/// A clinical-equipment or building-maintenance work order.
///
/// The remote tables predate any input validation, so every descriptive
/// field is nullable and the timestamp columns may hold empty strings
/// where NULL was intended.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct WorkOrder {
    pub id: i64,
    pub empresa: Option<String>,
    pub os: Option<String>,
    pub equipamento: Option<String>,
    pub situacao: Option<String>,
    pub prioridade: Option<String>,
    pub setor: Option<String>,
    pub oficina: Option<String>,
    pub tipomanutencao: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub abertura: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub fechamento: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub data_chamado: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub data_atendimento: Option<DateTime<Utc>>,
    pub responsavel: Option<String>,
    pub solicitante: Option<String>,
    pub causa: Option<String>,
    pub familia: Option<String>,
    pub tag: Option<String>,
    pub custo_os: Option<f64>,
    pub custo_mo: Option<f64>,
    pub custo_peca: Option<f64>,
    pub custo_servicoexterno: Option<f64>,
    pub company_id: Option<Uuid>,
}

/// Deserialize a timestamp column that may hold an empty string instead of
/// NULL (a known data-quality defect in the work-order tables).
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw else { return Ok(None) };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    parse_timestamp(trimmed)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {trimmed:?}")))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    // PostgREST emits `timestamp without time zone` columns without an offset
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_table_names() {
        assert_eq!(Dataset::Clinical.table(), "maintenance_orders");
        assert_eq!(Dataset::Building.table(), "building_orders");
    }

    #[test]
    fn empty_string_timestamps_deserialize_as_none() {
        let order: WorkOrder = serde_json::from_str(
            r#"{"id": 7, "os": "OS-123", "abertura": "", "fechamento": null}"#,
        )
        .unwrap();
        assert_eq!(order.id, 7);
        assert!(order.abertura.is_none());
        assert!(order.fechamento.is_none());
    }

    #[test]
    fn timestamps_with_and_without_offset_deserialize() {
        let order: WorkOrder = serde_json::from_str(
            r#"{"id": 1, "abertura": "2024-03-05T10:30:00+00:00", "fechamento": "2024-03-06T08:00:00"}"#,
        )
        .unwrap();
        assert_eq!(
            order.abertura.unwrap().to_rfc3339(),
            "2024-03-05T10:30:00+00:00"
        );
        assert!(order.fechamento.is_some());
    }

    #[test]
    fn garbage_timestamp_is_an_error() {
        let result =
            serde_json::from_str::<WorkOrder>(r#"{"id": 1, "abertura": "not a date"}"#);
        assert!(result.is_err());
    }
}
