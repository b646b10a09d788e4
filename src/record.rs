use serde::Deserialize;
use serde_json::{Number, Value};
use tracing::debug;

/// Rendered in place of a missing value.
pub const NULL_PLACEHOLDER: &str = "∅";

/// The six fixed columns of a usage record, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Mnc,
    BytesUsed,
    Dmcc,
    CellId,
    Ip,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Id,
        Field::Mnc,
        Field::BytesUsed,
        Field::Dmcc,
        Field::CellId,
        Field::Ip,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Mnc => "mnc",
            Field::BytesUsed => "bytes_used",
            Field::Dmcc => "dmcc",
            Field::CellId => "cellid",
            Field::Ip => "ip",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Field::Id => 0,
            Field::Mnc => 1,
            Field::BytesUsed => 2,
            Field::Dmcc => 3,
            Field::CellId => 4,
            Field::Ip => 5,
        }
    }

    pub fn next(&self) -> Field {
        Field::ALL[(self.index() + 1) % Field::ALL.len()]
    }

    pub fn previous(&self) -> Field {
        Field::ALL[(self.index() + Field::ALL.len() - 1) % Field::ALL.len()]
    }
}

/// One usage record as delivered by `GET {base}/records`.
///
/// Field values are kept as loose json scalars. Nothing beyond null handling
/// is validated; a missing key deserializes to `None` just like an explicit
/// `null`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub mnc: Option<Value>,
    #[serde(default)]
    pub bytes_used: Option<Value>,
    #[serde(default)]
    pub dmcc: Option<Value>,
    #[serde(default)]
    pub cellid: Option<Value>,
    #[serde(default)]
    pub ip: Option<Value>,
}

impl Record {
    /// Builds a record from one element of the fetched array.
    ///
    /// Anything that is not an object becomes an all-null record, so one bad
    /// element never rejects the batch.
    pub fn from_value(value: Value) -> Record {
        if !value.is_object() {
            debug!("Record element is not an object: {value}");
            return Record::default();
        }
        serde_json::from_value(value).unwrap_or_default()
    }

    pub fn get(&self, field: Field) -> Option<&Value> {
        let value = match field {
            Field::Id => Some(&self.id),
            Field::Mnc => self.mnc.as_ref(),
            Field::BytesUsed => self.bytes_used.as_ref(),
            Field::Dmcc => self.dmcc.as_ref(),
            Field::CellId => self.cellid.as_ref(),
            Field::Ip => self.ip.as_ref(),
        };
        // A malformed record may carry an explicit null id
        value.filter(|v| !v.is_null())
    }

    /// String form used for matching and display, `None` for null.
    pub fn text(&self, field: Field) -> Option<String> {
        self.get(field).map(value_to_text)
    }

    /// Display text with nulls replaced by [`NULL_PLACEHOLDER`].
    pub fn cell(&self, field: Field) -> String {
        self.text(field).unwrap_or_else(|| NULL_PLACEHOLDER.to_string())
    }

    /// Numeric key for sorting by `bytes_used`.
    ///
    /// Null and non numeric values compare as -1.
    pub fn bytes_used_key(&self) -> f64 {
        match self.get(Field::BytesUsed) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(-1.0),
            Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(-1.0),
            _ => -1.0,
        }
    }
}

pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => number_to_text(n),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// Integral floats print without a fraction, 50.0 reads as 50
fn number_to_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
        _ => n.to_string(),
    }
}

/// Holds the record collection exactly as retrieved.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    pub fn replace(&mut self, records: Vec<Record>) {
        debug!(
            "Replacing {} stored records with {}",
            self.records.len(),
            records.len()
        );
        self.records = records;
    }

    pub fn get(&self) -> &[Record] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
