//! Webhook records
//!
//! A [`WebhookRecord`] is one row event from Orca. Orca marks its own metadata
//! with a `___` prefix (`___orca_action`, `___orca_sheet_name`, ...); every
//! other key is a column of the user's sheet and is opaque to the relay.
//!
//! Known system fields get typed slots, unknown system fields and all domain
//! fields are kept in ordered maps so nothing from the payload is lost.

use crate::config::ReceiverConfig;
use crate::error::{OrcaError, OrcaResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Prefix reserved by Orca for system fields
pub const RESERVED_PREFIX: &str = "___";

pub const ACTION_FIELD: &str = "___orca_action";
pub const SHEET_NAME_FIELD: &str = "___orca_sheet_name";
pub const USER_EMAIL_FIELD: &str = "___orca_user_email";
pub const ROW_ID_FIELD: &str = "___orca_row_id";
pub const SCHEMA_VERSION_FIELD: &str = "___orca_schema_version";
pub const OWNER_FIELD: &str = "___orca_owner";

/// Returns true when `name` is an Orca system field
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Row event kinds Orca reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrcaAction {
    Add,
    Update,
    Delete,
    Test,
}

impl OrcaAction {
    pub const ALL: [OrcaAction; 4] = [
        OrcaAction::Add,
        OrcaAction::Update,
        OrcaAction::Delete,
        OrcaAction::Test,
    ];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrcaAction::Add => "add",
            OrcaAction::Update => "update",
            OrcaAction::Delete => "delete",
            OrcaAction::Test => "test",
        }
    }

    /// Exact, case-sensitive match against the wire value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "add" => Some(OrcaAction::Add),
            "update" => Some(OrcaAction::Update),
            "delete" => Some(OrcaAction::Delete),
            "test" => Some(OrcaAction::Test),
            _ => None,
        }
    }
}

impl fmt::Display for OrcaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrcaAction {
    type Err = OrcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| OrcaError::decode(format!("unknown action `{}`", s)))
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Number(n) => Value::Number(n.clone()),
            FieldValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// One row event received from Orca
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookRecord {
    /// Raw `___orca_action` value, if present
    pub action: Option<String>,
    /// Sheet the event belongs to
    pub sheet_name: Option<String>,
    /// Email of the user who made the change; Orca sends `""` over plain HTTP
    pub user_email: Option<String>,
    pub row_id: Option<String>,
    pub schema_version: Option<String>,
    pub owner: Option<String>,
    /// Reserved-prefix fields without a typed slot
    pub extra_system: BTreeMap<String, FieldValue>,
    /// User-defined columns
    pub fields: BTreeMap<String, FieldValue>,
}

impl WebhookRecord {
    /// The recognised action, or `None` for an absent or unknown value
    pub fn orca_action(&self) -> Option<OrcaAction> {
        self.action.as_deref().and_then(OrcaAction::parse)
    }

    /// Sheet name, empty when absent
    pub fn sheet_name(&self) -> &str {
        self.sheet_name.as_deref().unwrap_or("")
    }

    /// User email, empty when absent
    pub fn user_email(&self) -> &str {
        self.user_email.as_deref().unwrap_or("")
    }

    /// Look up a domain field
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Domain field rendered as a string
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(ToString::to_string)
    }

    /// Flatten back into the wire shape
    pub fn to_json_map(&self) -> Map<String, Value> {
        let mut map = Map::new();

        let typed = [
            (ACTION_FIELD, self.action.as_deref()),
            (SHEET_NAME_FIELD, self.sheet_name.as_deref()),
            (USER_EMAIL_FIELD, self.user_email.as_deref()),
            (ROW_ID_FIELD, self.row_id.as_deref()),
            (SCHEMA_VERSION_FIELD, self.schema_version.as_deref()),
            (OWNER_FIELD, self.owner.as_deref()),
        ];
        for (name, value) in typed {
            if let Some(value) = value {
                map.insert(name.to_string(), Value::String(value.to_string()));
            }
        }

        for (name, value) in self.extra_system.iter().chain(self.fields.iter()) {
            map.insert(name.clone(), value.to_json());
        }

        map
    }

    fn set_system(&mut self, name: String, value: FieldValue) {
        match name.as_str() {
            ACTION_FIELD => self.action = Some(value.to_string()),
            SHEET_NAME_FIELD => self.sheet_name = Some(value.to_string()),
            USER_EMAIL_FIELD => self.user_email = Some(value.to_string()),
            ROW_ID_FIELD => self.row_id = Some(value.to_string()),
            SCHEMA_VERSION_FIELD => self.schema_version = Some(value.to_string()),
            OWNER_FIELD => self.owner = Some(value.to_string()),
            _ => {
                self.extra_system.insert(name, value);
            }
        }
    }
}

/// How domain fields are decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Accept any field set, scalar values become text
    #[default]
    Open,
    /// Only declared fields, each with a fixed JSON type
    Schema,
}

/// JSON type of a declared domain field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decodes request bodies into [`WebhookRecord`]s
#[derive(Debug, Clone, Default)]
pub struct RecordDecoder {
    mode: DecodeMode,
    schema: BTreeMap<String, FieldKind>,
    reject_unknown: bool,
}

impl RecordDecoder {
    /// Decoder accepting any field set
    pub fn open() -> Self {
        Self::default()
    }

    /// Decoder enforcing declared field types
    pub fn with_schema<I, S>(fields: I, reject_unknown: bool) -> Self
    where
        I: IntoIterator<Item = (S, FieldKind)>,
        S: Into<String>,
    {
        Self {
            mode: DecodeMode::Schema,
            schema: fields
                .into_iter()
                .map(|(name, kind)| (name.into(), kind))
                .collect(),
            reject_unknown,
        }
    }

    pub fn from_config(config: &ReceiverConfig) -> Self {
        match config.decode_mode {
            DecodeMode::Open => Self::open(),
            DecodeMode::Schema => Self::with_schema(
                config
                    .schema
                    .iter()
                    .map(|field| (field.name.clone(), field.kind)),
                config.reject_unknown_fields,
            ),
        }
    }

    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Decode one request body
    pub fn decode(&self, body: &[u8]) -> OrcaResult<WebhookRecord> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| OrcaError::decode(e.to_string()))?;

        let object = match value {
            Value::Object(object) => object,
            other => {
                return Err(OrcaError::decode(format!(
                    "expected a JSON object, found {}",
                    json_kind(&other)
                )))
            }
        };

        let mut record = WebhookRecord::default();

        for (name, value) in object {
            if is_reserved(&name) {
                if let Some(value) = coerce_text(&name, value)? {
                    record.set_system(name, value);
                }
                continue;
            }

            let decoded = match self.mode {
                DecodeMode::Open => coerce_text(&name, value)?,
                DecodeMode::Schema => self.decode_declared(&name, value)?,
            };
            if let Some(decoded) = decoded {
                record.fields.insert(name, decoded);
            }
        }

        Ok(record)
    }

    fn decode_declared(&self, name: &str, value: Value) -> OrcaResult<Option<FieldValue>> {
        let Some(kind) = self.schema.get(name) else {
            if self.reject_unknown {
                return Err(OrcaError::decode(format!("unknown field `{}`", name)));
            }
            return Ok(None);
        };

        match (kind, value) {
            (_, Value::Null) => Ok(None),
            (FieldKind::Text, Value::String(s)) => Ok(Some(FieldValue::Text(s))),
            (FieldKind::Number, Value::Number(n)) => Ok(Some(FieldValue::Number(n))),
            (FieldKind::Boolean, Value::Bool(b)) => Ok(Some(FieldValue::Bool(b))),
            (kind, other) => Err(OrcaError::decode(format!(
                "field `{}`: expected {}, found {}",
                name,
                kind.as_str(),
                json_kind(&other)
            ))),
        }
    }
}

/// Scalars become text, null is treated as absent
fn coerce_text(name: &str, value: Value) -> OrcaResult<Option<FieldValue>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(FieldValue::Text(s))),
        Value::Number(n) => Ok(Some(FieldValue::Text(n.to_string()))),
        Value::Bool(b) => Ok(Some(FieldValue::Text(b.to_string()))),
        other => Err(OrcaError::decode(format!(
            "field `{}`: expected a string, found {}",
            name,
            json_kind(&other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("add", Some(OrcaAction::Add))]
    #[case("update", Some(OrcaAction::Update))]
    #[case("delete", Some(OrcaAction::Delete))]
    #[case("test", Some(OrcaAction::Test))]
    #[case("ADD", None)]
    #[case("bogus", None)]
    #[case("", None)]
    fn test_action_parse(#[case] raw: &str, #[case] expected: Option<OrcaAction>) {
        assert_eq!(OrcaAction::parse(raw), expected);
    }

    #[test]
    fn test_action_round_trips_through_str() {
        for action in OrcaAction::ALL {
            assert_eq!(action.as_str().parse::<OrcaAction>().unwrap(), action);
        }
        assert!("nope".parse::<OrcaAction>().is_err());
    }

    #[test]
    fn test_decode_add_event() {
        let body = br#"{"___orca_action":"add","Barcode":"123","Name":"Widget"}"#;
        let record = RecordDecoder::open().decode(body).unwrap();

        assert_eq!(record.orca_action(), Some(OrcaAction::Add));
        assert_eq!(record.sheet_name(), "");
        assert_eq!(record.user_email(), "");
        assert_eq!(record.user_email, None);
        assert_eq!(record.text("Barcode").as_deref(), Some("123"));
        assert_eq!(record.text("Name").as_deref(), Some("Widget"));
        assert_eq!(record.fields.len(), 2);
    }

    #[test]
    fn test_decode_system_fields() {
        let body = json!({
            "___orca_action": "update",
            "___orca_sheet_name": "Inventory",
            "___orca_user_email": "ops@example.com",
            "___orca_row_id": "5f3c",
            "___orca_schema_version": "7",
            "___orca_owner": "owner@example.com",
            "___orca_location": "51.5,-0.1",
            "Location": "Shelf 4"
        });
        let record = RecordDecoder::open()
            .decode(body.to_string().as_bytes())
            .unwrap();

        assert_eq!(record.orca_action(), Some(OrcaAction::Update));
        assert_eq!(record.sheet_name(), "Inventory");
        assert_eq!(record.user_email(), "ops@example.com");
        assert_eq!(record.row_id.as_deref(), Some("5f3c"));
        assert_eq!(record.schema_version.as_deref(), Some("7"));
        assert_eq!(record.owner.as_deref(), Some("owner@example.com"));
        assert_eq!(
            record.extra_system.get("___orca_location"),
            Some(&FieldValue::from("51.5,-0.1"))
        );
        assert!(!record.fields.contains_key("___orca_location"));
        assert_eq!(record.text("Location").as_deref(), Some("Shelf 4"));
    }

    #[test]
    fn test_unknown_action_is_kept_raw() {
        let record = RecordDecoder::open()
            .decode(br#"{"___orca_action":"bogus"}"#)
            .unwrap();
        assert_eq!(record.action.as_deref(), Some("bogus"));
        assert_eq!(record.orca_action(), None);
    }

    #[test]
    fn test_open_mode_coerces_scalars() {
        let record = RecordDecoder::open()
            .decode(br#"{"Quantity":12,"InStock":true,"Note":null}"#)
            .unwrap();
        assert_eq!(record.field("Quantity"), Some(&FieldValue::from("12")));
        assert_eq!(record.field("InStock"), Some(&FieldValue::from("true")));
        assert_eq!(record.field("Note"), None);
    }

    #[rstest]
    #[case(br#"not json"#.as_slice())]
    #[case(br#"{"Barcode":"1""#.as_slice())]
    #[case(br#"["add"]"#.as_slice())]
    #[case(br#""add""#.as_slice())]
    #[case(br#"{"Tags":["a","b"]}"#.as_slice())]
    #[case(br#"{"___orca_action":{"kind":"add"}}"#.as_slice())]
    fn test_open_mode_rejects(#[case] body: &[u8]) {
        let err = RecordDecoder::open().decode(body).unwrap_err();
        assert!(matches!(err, OrcaError::Decode { .. }));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_non_object_message() {
        let err = RecordDecoder::open().decode(b"[1,2]").unwrap_err();
        assert_eq!(err.to_string(), "expected a JSON object, found array");
    }

    fn inventory_decoder(reject_unknown: bool) -> RecordDecoder {
        RecordDecoder::with_schema(
            [
                ("Barcode", FieldKind::Text),
                ("Name", FieldKind::Text),
                ("Quantity", FieldKind::Number),
                ("Active", FieldKind::Boolean),
            ],
            reject_unknown,
        )
    }

    #[test]
    fn test_schema_mode_typed_fields() {
        let body = br#"{"___orca_action":"add","Barcode":"0123","Quantity":12,"Active":false,"Colour":"red"}"#;
        let record = inventory_decoder(false).decode(body).unwrap();

        assert_eq!(record.orca_action(), Some(OrcaAction::Add));
        assert_eq!(record.field("Barcode"), Some(&FieldValue::from("0123")));
        assert_eq!(
            record.field("Quantity"),
            Some(&FieldValue::Number(Number::from(12)))
        );
        assert_eq!(record.field("Active"), Some(&FieldValue::Bool(false)));
        assert_eq!(record.field("Colour"), None);
    }

    #[test]
    fn test_schema_mode_type_mismatch() {
        let err = inventory_decoder(false)
            .decode(br#"{"Quantity":"12"}"#)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "field `Quantity`: expected number, found string"
        );
    }

    #[test]
    fn test_schema_mode_rejects_unknown_when_asked() {
        let err = inventory_decoder(true)
            .decode(br#"{"Colour":"red"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown field `Colour`");
    }

    #[test]
    fn test_from_config() {
        let mut config = ReceiverConfig::default();
        assert_eq!(RecordDecoder::from_config(&config).mode(), DecodeMode::Open);

        config.decode_mode = DecodeMode::Schema;
        config.schema.push(crate::config::SchemaField {
            name: "Quantity".to_string(),
            kind: FieldKind::Number,
        });
        let decoder = RecordDecoder::from_config(&config);
        assert_eq!(decoder.mode(), DecodeMode::Schema);
        assert!(decoder.decode(br#"{"Quantity":"x"}"#).is_err());
    }

    #[rstest]
    #[case(json!({
        "___orca_action": "delete",
        "___orca_sheet_name": "Stock",
        "___orca_custom": "x",
        "Barcode": "42",
    }))]
    #[case(json!({
        "___orca_action": "add",
        "___orca_sheet_name": "Stock",
        "___orca_user_email": "",
        "Name": "Widget",
    }))]
    #[case(json!({"___orca_sheet_name": "", "Name": ""}))]
    fn test_to_json_map_restores_wire_shape(#[case] body: Value) {
        let record = RecordDecoder::open()
            .decode(body.to_string().as_bytes())
            .unwrap();

        assert_eq!(Value::Object(record.to_json_map()), body);
    }
}
