use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

pub type EntryId = i64;

/// Every user-settable field of a diary entry. `id` is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Timestamp,
    MealType,
    FoodName,
    Quantity,
    Unit,
    CarbohydratesG,
    GlucoseBefore,
    GlucoseAfter2h,
    InsulinUnits,
    ActiveInsulin,
    CorrectiveDose,
    CorrectiveDoseDelayMin,
    Notes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Timestamp,
    Text,
    Real,
    Integer,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::Timestamp,
        Field::MealType,
        Field::FoodName,
        Field::Quantity,
        Field::Unit,
        Field::CarbohydratesG,
        Field::GlucoseBefore,
        Field::GlucoseAfter2h,
        Field::InsulinUnits,
        Field::ActiveInsulin,
        Field::CorrectiveDose,
        Field::CorrectiveDoseDelayMin,
        Field::Notes,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Field::Timestamp => "timestamp",
            Field::MealType => "meal_type",
            Field::FoodName => "food_name",
            Field::Quantity => "quantity",
            Field::Unit => "unit",
            Field::CarbohydratesG => "carbohydrates_g",
            Field::GlucoseBefore => "glucose_before",
            Field::GlucoseAfter2h => "glucose_after_2h",
            Field::InsulinUnits => "insulin_units",
            Field::ActiveInsulin => "active_insulin",
            Field::CorrectiveDose => "corrective_dose",
            Field::CorrectiveDoseDelayMin => "corrective_dose_delay_min",
            Field::Notes => "notes",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    #[must_use]
    pub fn kind(self) -> FieldKind {
        match self {
            Field::Timestamp => FieldKind::Timestamp,
            Field::MealType | Field::FoodName | Field::Unit | Field::Notes => FieldKind::Text,
            Field::CorrectiveDoseDelayMin => FieldKind::Integer,
            Field::Quantity
            | Field::CarbohydratesG
            | Field::GlucoseBefore
            | Field::GlucoseAfter2h
            | Field::InsulinUnits
            | Field::ActiveInsulin
            | Field::CorrectiveDose => FieldKind::Real,
        }
    }

    /// Amounts and doses cannot be negative. Glucose readings are left alone.
    #[must_use]
    pub fn is_non_negative(self) -> bool {
        matches!(
            self,
            Field::Quantity
                | Field::CarbohydratesG
                | Field::InsulinUnits
                | Field::ActiveInsulin
                | Field::CorrectiveDose
                | Field::CorrectiveDoseDelayMin
        )
    }
}

/// A single field value on its way to a store. `Null` clears the column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Real(f64),
    Integer(i64),
    Timestamp(NaiveDateTime),
}

impl FieldValue {
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Real(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
            FieldValue::Integer(v) => Value::from(*v),
            FieldValue::Timestamp(ts) => Value::String(format_iso(*ts)),
        }
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Text)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Real)
    }
}

impl From<Option<i64>> for FieldValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Integer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: EntryId,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub meal_type: Option<String>,
    pub food_name: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub carbohydrates_g: Option<f64>,
    pub glucose_before: Option<f64>,
    pub glucose_after_2h: Option<f64>,
    pub insulin_units: Option<f64>,
    pub active_insulin: Option<f64>,
    pub corrective_dose: Option<f64>,
    pub corrective_dose_delay_min: Option<i64>,
    pub notes: Option<String>,
}

impl DiaryEntry {
    /// The entry's data without its store-assigned id.
    #[must_use]
    pub fn without_id(&self) -> NewEntry {
        NewEntry {
            timestamp: self.timestamp,
            meal_type: self.meal_type.clone(),
            food_name: self.food_name.clone(),
            quantity: self.quantity,
            unit: self.unit.clone(),
            carbohydrates_g: self.carbohydrates_g,
            glucose_before: self.glucose_before,
            glucose_after_2h: self.glucose_after_2h,
            insulin_units: self.insulin_units,
            active_insulin: self.active_insulin,
            corrective_dose: self.corrective_dose,
            corrective_dose_delay_min: self.corrective_dose_delay_min,
            notes: self.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub meal_type: Option<String>,
    pub food_name: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub carbohydrates_g: Option<f64>,
    pub glucose_before: Option<f64>,
    pub glucose_after_2h: Option<f64>,
    pub insulin_units: Option<f64>,
    pub active_insulin: Option<f64>,
    pub corrective_dose: Option<f64>,
    pub corrective_dose_delay_min: Option<i64>,
    pub notes: Option<String>,
}

impl NewEntry {
    /// An entry with only its timestamp set.
    #[must_use]
    pub fn at(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            meal_type: None,
            food_name: None,
            quantity: None,
            unit: None,
            carbohydrates_g: None,
            glucose_before: None,
            glucose_after_2h: None,
            insulin_units: None,
            active_insulin: None,
            corrective_dose: None,
            corrective_dose_delay_min: None,
            notes: None,
        }
    }

    /// Build an entry from loosely-typed field/value pairs.
    ///
    /// `timestamp` must be present and non-null; `id` and unknown names are rejected.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, ValidationError> {
        let timestamp = match fields.get(Field::Timestamp.name()) {
            None | Some(Value::Null) => return Err(ValidationError::MissingTimestamp),
            Some(value) => parse_timestamp_value(value)?,
        };
        let mut entry = Self::at(timestamp);
        for (name, value) in fields {
            match lookup_field(name)? {
                Field::Timestamp => {}
                Field::MealType => entry.meal_type = text(Field::MealType, value)?,
                Field::FoodName => entry.food_name = text(Field::FoodName, value)?,
                Field::Quantity => entry.quantity = real(Field::Quantity, value)?,
                Field::Unit => entry.unit = text(Field::Unit, value)?,
                Field::CarbohydratesG => {
                    entry.carbohydrates_g = real(Field::CarbohydratesG, value)?;
                }
                Field::GlucoseBefore => entry.glucose_before = real(Field::GlucoseBefore, value)?,
                Field::GlucoseAfter2h => {
                    entry.glucose_after_2h = real(Field::GlucoseAfter2h, value)?;
                }
                Field::InsulinUnits => entry.insulin_units = real(Field::InsulinUnits, value)?,
                Field::ActiveInsulin => entry.active_insulin = real(Field::ActiveInsulin, value)?,
                Field::CorrectiveDose => {
                    entry.corrective_dose = real(Field::CorrectiveDose, value)?;
                }
                Field::CorrectiveDoseDelayMin => {
                    entry.corrective_dose_delay_min =
                        integer(Field::CorrectiveDoseDelayMin, value)?;
                }
                Field::Notes => entry.notes = text(Field::Notes, value)?,
            }
        }
        Ok(entry)
    }

    /// All fields in registry order, absent ones as `Null`.
    #[must_use]
    pub fn values(&self) -> Vec<(Field, FieldValue)> {
        vec![
            (Field::Timestamp, FieldValue::Timestamp(self.timestamp)),
            (Field::MealType, self.meal_type.clone().into()),
            (Field::FoodName, self.food_name.clone().into()),
            (Field::Quantity, self.quantity.into()),
            (Field::Unit, self.unit.clone().into()),
            (Field::CarbohydratesG, self.carbohydrates_g.into()),
            (Field::GlucoseBefore, self.glucose_before.into()),
            (Field::GlucoseAfter2h, self.glucose_after_2h.into()),
            (Field::InsulinUnits, self.insulin_units.into()),
            (Field::ActiveInsulin, self.active_insulin.into()),
            (Field::CorrectiveDose, self.corrective_dose.into()),
            (Field::CorrectiveDoseDelayMin, self.corrective_dose_delay_min.into()),
            (Field::Notes, self.notes.clone().into()),
        ]
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_values(&self.values())
    }
}

/// A partial update.
///
/// Outer `None` leaves a field untouched. For optional fields `Some(None)`
/// clears the stored value and `Some(Some(v))` replaces it. The timestamp can
/// be replaced but never cleared.
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(clippy::option_option)]
pub struct EntryUpdate {
    pub timestamp: Option<NaiveDateTime>,
    pub meal_type: Option<Option<String>>,
    pub food_name: Option<Option<String>>,
    pub quantity: Option<Option<f64>>,
    pub unit: Option<Option<String>>,
    pub carbohydrates_g: Option<Option<f64>>,
    pub glucose_before: Option<Option<f64>>,
    pub glucose_after_2h: Option<Option<f64>>,
    pub insulin_units: Option<Option<f64>>,
    pub active_insulin: Option<Option<f64>>,
    pub corrective_dose: Option<Option<f64>>,
    pub corrective_dose_delay_min: Option<Option<i64>>,
    pub notes: Option<Option<String>>,
}

impl EntryUpdate {
    /// Build an update from loosely-typed field/value pairs.
    ///
    /// A missing key leaves the field untouched, an explicit `null` clears it.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, ValidationError> {
        let mut update = Self::default();
        for (name, value) in fields {
            match lookup_field(name)? {
                Field::Timestamp => {
                    if value.is_null() {
                        return Err(ValidationError::invalid(
                            Field::Timestamp.name(),
                            "cannot be cleared",
                        ));
                    }
                    update.timestamp = Some(parse_timestamp_value(value)?);
                }
                Field::MealType => update.meal_type = Some(text(Field::MealType, value)?),
                Field::FoodName => update.food_name = Some(text(Field::FoodName, value)?),
                Field::Quantity => update.quantity = Some(real(Field::Quantity, value)?),
                Field::Unit => update.unit = Some(text(Field::Unit, value)?),
                Field::CarbohydratesG => {
                    update.carbohydrates_g = Some(real(Field::CarbohydratesG, value)?);
                }
                Field::GlucoseBefore => {
                    update.glucose_before = Some(real(Field::GlucoseBefore, value)?);
                }
                Field::GlucoseAfter2h => {
                    update.glucose_after_2h = Some(real(Field::GlucoseAfter2h, value)?);
                }
                Field::InsulinUnits => {
                    update.insulin_units = Some(real(Field::InsulinUnits, value)?);
                }
                Field::ActiveInsulin => {
                    update.active_insulin = Some(real(Field::ActiveInsulin, value)?);
                }
                Field::CorrectiveDose => {
                    update.corrective_dose = Some(real(Field::CorrectiveDose, value)?);
                }
                Field::CorrectiveDoseDelayMin => {
                    update.corrective_dose_delay_min =
                        Some(integer(Field::CorrectiveDoseDelayMin, value)?);
                }
                Field::Notes => update.notes = Some(text(Field::Notes, value)?),
            }
        }
        Ok(update)
    }

    /// Only the fields this update touches, in registry order.
    #[must_use]
    pub fn changes(&self) -> Vec<(Field, FieldValue)> {
        fn push<T: Clone + Into<FieldValue>>(
            changes: &mut Vec<(Field, FieldValue)>,
            field: Field,
            value: Option<&T>,
        ) {
            if let Some(v) = value {
                changes.push((field, v.clone().into()));
            }
        }

        let mut changes = Vec::new();
        if let Some(ts) = self.timestamp {
            changes.push((Field::Timestamp, FieldValue::Timestamp(ts)));
        }
        push(&mut changes, Field::MealType, self.meal_type.as_ref());
        push(&mut changes, Field::FoodName, self.food_name.as_ref());
        push(&mut changes, Field::Quantity, self.quantity.as_ref());
        push(&mut changes, Field::Unit, self.unit.as_ref());
        push(&mut changes, Field::CarbohydratesG, self.carbohydrates_g.as_ref());
        push(&mut changes, Field::GlucoseBefore, self.glucose_before.as_ref());
        push(&mut changes, Field::GlucoseAfter2h, self.glucose_after_2h.as_ref());
        push(&mut changes, Field::InsulinUnits, self.insulin_units.as_ref());
        push(&mut changes, Field::ActiveInsulin, self.active_insulin.as_ref());
        push(&mut changes, Field::CorrectiveDose, self.corrective_dose.as_ref());
        push(
            &mut changes,
            Field::CorrectiveDoseDelayMin,
            self.corrective_dose_delay_min.as_ref(),
        );
        push(&mut changes, Field::Notes, self.notes.as_ref());
        changes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes().is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_values(&self.changes())
    }
}

fn validate_values(values: &[(Field, FieldValue)]) -> Result<(), ValidationError> {
    for (field, value) in values {
        match value {
            FieldValue::Real(v) if !v.is_finite() => {
                return Err(ValidationError::invalid(field.name(), "must be a finite number"));
            }
            FieldValue::Real(v) if field.is_non_negative() && *v < 0.0 => {
                return Err(ValidationError::invalid(field.name(), "must not be negative"));
            }
            FieldValue::Integer(v) if field.is_non_negative() && *v < 0 => {
                return Err(ValidationError::invalid(field.name(), "must not be negative"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn lookup_field(name: &str) -> Result<Field, ValidationError> {
    if name == "id" {
        return Err(ValidationError::ImmutableField("id"));
    }
    Field::from_name(name).ok_or_else(|| ValidationError::UnknownField(name.to_string()))
}

fn text(field: Field, value: &Value) -> Result<Option<String>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(ValidationError::invalid(field.name(), "must be a string")),
    }
}

fn real(field: Field, value: &Value) -> Result<Option<f64>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| ValidationError::invalid(field.name(), "must be a number")),
        _ => Err(ValidationError::invalid(field.name(), "must be a number")),
    }
}

/// 2^63: whole floats in `[-2^63, 2^63)` convert to `i64` exactly.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn integer(field: Field, value: &Value) -> Result<Option<i64>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                return Ok(Some(v));
            }
            match n.as_f64() {
                Some(v) if v.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&v) => {
                    Ok(Some(v as i64))
                }
                Some(v) if v.fract() == 0.0 => {
                    Err(ValidationError::invalid(field.name(), "is out of range"))
                }
                _ => Err(ValidationError::invalid(field.name(), "must be a whole number")),
            }
        }
        _ => Err(ValidationError::invalid(field.name(), "must be a whole number")),
    }
}

fn parse_timestamp_value(value: &Value) -> Result<NaiveDateTime, ValidationError> {
    value.as_str().and_then(parse_timestamp).ok_or_else(|| {
        ValidationError::invalid(
            Field::Timestamp.name(),
            "must be a date-time such as 2024-01-01T08:00:00",
        )
    })
}

/// Storage format for the embedded store, matching rows written by earlier releases.
pub(crate) const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const ISO_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[must_use]
pub fn format_iso(ts: NaiveDateTime) -> String {
    ts.format(ISO_TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn format_sqlite(ts: NaiveDateTime) -> String {
    ts.format(SQLITE_TIMESTAMP_FORMAT).to_string()
}

/// Parse a date-time in any of the shapes the stores or the entry form produce.
///
/// Offsets are dropped and the wall-clock time kept; a bare date means midnight.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    let s = s.trim();
    for fmt in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_iso(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_timestamp(&s).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.name()), Some(field));
        }
        assert_eq!(Field::from_name("id"), None);
        assert_eq!(Field::from_name("calories"), None);
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-01-01T08:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 08:00:00.000000"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T08:00:00+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-01-01"),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_sqlite_format_matches_legacy_rows() {
        assert_eq!(format_sqlite(ts("2024-01-01T08:00")), "2024-01-01 08:00:00.000000");
        assert_eq!(format_iso(ts("2024-01-01T08:00")), "2024-01-01T08:00:00");
    }

    #[test]
    fn test_new_entry_from_fields() {
        let entry = NewEntry::from_fields(&fields(json!({
            "timestamp": "2024-01-01T08:00",
            "food_name": "Oatmeal",
            "quantity": 100,
            "unit": "g",
            "carbohydrates_g": 27,
            "glucose_before": 95,
            "corrective_dose_delay_min": 30,
            "notes": null,
        })))
        .unwrap();

        assert_eq!(entry.timestamp, ts("2024-01-01T08:00"));
        assert_eq!(entry.food_name.as_deref(), Some("Oatmeal"));
        assert_eq!(entry.quantity, Some(100.0));
        assert_eq!(entry.carbohydrates_g, Some(27.0));
        assert_eq!(entry.corrective_dose_delay_min, Some(30));
        assert!(entry.glucose_after_2h.is_none());
        assert!(entry.notes.is_none());
    }

    #[test]
    fn test_new_entry_requires_timestamp() {
        let err = NewEntry::from_fields(&fields(json!({ "food_name": "Toast" }))).unwrap_err();
        assert_eq!(err, ValidationError::MissingTimestamp);

        let err = NewEntry::from_fields(&fields(json!({ "timestamp": null }))).unwrap_err();
        assert_eq!(err, ValidationError::MissingTimestamp);
    }

    #[test]
    fn test_new_entry_rejects_id() {
        let err = NewEntry::from_fields(&fields(json!({
            "id": 7,
            "timestamp": "2024-01-01T08:00",
        })))
        .unwrap_err();
        assert_eq!(err.field(), Some("id"));
    }

    #[test]
    fn test_wrong_value_type_names_field() {
        let err = NewEntry::from_fields(&fields(json!({
            "timestamp": "2024-01-01T08:00",
            "quantity": "lots",
        })))
        .unwrap_err();
        assert_eq!(err.field(), Some("quantity"));

        let err = NewEntry::from_fields(&fields(json!({
            "timestamp": "2024-01-01T08:00",
            "corrective_dose_delay_min": 12.5,
        })))
        .unwrap_err();
        assert_eq!(err.field(), Some("corrective_dose_delay_min"));
    }

    #[test]
    fn test_integer_out_of_range() {
        let err = EntryUpdate::from_fields(&fields(json!({
            "corrective_dose_delay_min": 1e30,
        })))
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::invalid("corrective_dose_delay_min", "is out of range")
        );

        let err = NewEntry::from_fields(&fields(json!({
            "timestamp": "2024-01-01T08:00",
            "corrective_dose_delay_min": 10_000_000_000_000_000_000_u64,
        })))
        .unwrap_err();
        assert_eq!(err.field(), Some("corrective_dose_delay_min"));

        let update = EntryUpdate::from_fields(&fields(json!({
            "corrective_dose_delay_min": 45.0,
        })))
        .unwrap();
        assert_eq!(update.corrective_dose_delay_min, Some(Some(45)));
    }

    #[test]
    fn test_update_absent_vs_null() {
        let update = EntryUpdate::from_fields(&fields(json!({
            "quantity": 150,
            "notes": null,
        })))
        .unwrap();

        assert_eq!(update.quantity, Some(Some(150.0)));
        assert_eq!(update.notes, Some(None));
        assert_eq!(update.food_name, None);
        assert_eq!(
            update.changes(),
            vec![
                (Field::Quantity, FieldValue::Real(150.0)),
                (Field::Notes, FieldValue::Null),
            ]
        );
    }

    #[test]
    fn test_update_rejects_unknown_and_id() {
        let err = EntryUpdate::from_fields(&fields(json!({ "calories": 200 }))).unwrap_err();
        assert_eq!(err, ValidationError::UnknownField("calories".to_string()));

        let err = EntryUpdate::from_fields(&fields(json!({ "id": 2 }))).unwrap_err();
        assert_eq!(err, ValidationError::ImmutableField("id"));
    }

    #[test]
    fn test_update_cannot_clear_timestamp() {
        let err = EntryUpdate::from_fields(&fields(json!({ "timestamp": null }))).unwrap_err();
        assert_eq!(err.field(), Some("timestamp"));
    }

    #[test]
    fn test_empty_update() {
        let update = EntryUpdate::from_fields(&Map::new()).unwrap();
        assert!(update.is_empty());
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_validate_non_negative() {
        let mut entry = NewEntry::at(ts("2024-01-01T08:00"));
        entry.glucose_before = Some(-5.0);
        assert!(entry.validate().is_ok());

        entry.insulin_units = Some(-1.0);
        let err = entry.validate().unwrap_err();
        assert_eq!(err.field(), Some("insulin_units"));

        let update = EntryUpdate {
            corrective_dose_delay_min: Some(Some(-10)),
            ..EntryUpdate::default()
        };
        assert_eq!(
            update.validate().unwrap_err().field(),
            Some("corrective_dose_delay_min")
        );
    }

    #[test]
    fn test_validate_rejects_nan() {
        let mut entry = NewEntry::at(ts("2024-01-01T08:00"));
        entry.glucose_after_2h = Some(f64::NAN);
        assert_eq!(entry.validate().unwrap_err().field(), Some("glucose_after_2h"));
    }

    #[test]
    fn test_entry_serde_round_trip() {
        let entry = DiaryEntry {
            id: 4,
            timestamp: ts("2024-03-10T12:30"),
            meal_type: Some("lunch".to_string()),
            food_name: Some("Pasta".to_string()),
            quantity: Some(80.0),
            unit: Some("g".to_string()),
            carbohydrates_g: Some(60.0),
            glucose_before: Some(110.0),
            glucose_after_2h: None,
            insulin_units: Some(5.0),
            active_insulin: None,
            corrective_dose: None,
            corrective_dose_delay_min: None,
            notes: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["timestamp"], "2024-03-10T12:30:00");
        assert_eq!(json["glucose_after_2h"], Value::Null);

        let back: DiaryEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
        assert_eq!(back.without_id().food_name.as_deref(), Some("Pasta"));
    }
}
