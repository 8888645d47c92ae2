/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
 * Reference: http://mcu.so/Microcontroller/Automotive/dbc-file-format-documentation_compress.pdf
 */

//! Typed attribute definitions (`BA_DEF_`, `BA_DEF_DEF_`) and value conversion.
//!
//! Enumerations are the delicate part: every source encodes `BA_` values as an
//! index into its own `ENUM` list, while the network keeps one merged list used
//! for output. Well-known attributes additionally carry a canonical ordinal
//! table so that merged lists keep the order other DBC tools expect.

use crate::data::{AttrValue, Network};
use crate::error::{DbcError, DbcResult};
use heck::ToLowerCamelCase;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Entity kind owning an attribute.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttrObject {
    Network,
    Node,
    Message,
    Signal,
    EnvironmentVariable,
    /// `BU_SG_REL_` relation attribute (node mapped rx signal)
    NodeMappedRxSignal,
}

impl AttrObject {
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "BU_" => Some(AttrObject::Node),
            "BO_" => Some(AttrObject::Message),
            "SG_" => Some(AttrObject::Signal),
            "EV_" => Some(AttrObject::EnvironmentVariable),
            "BU_SG_REL_" => Some(AttrObject::NodeMappedRxSignal),
            _ => None,
        }
    }

    /// Object keyword as written after `BA_DEF_`, empty for the network.
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            AttrObject::Network => "",
            AttrObject::Node => "BU_",
            AttrObject::Message => "BO_",
            AttrObject::Signal => "SG_",
            AttrObject::EnvironmentVariable => "EV_",
            AttrObject::NodeMappedRxSignal => "BU_SG_REL_",
        }
    }

    #[must_use]
    pub fn is_relation(&self) -> bool {
        *self == AttrObject::NodeMappedRxSignal
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttrKind {
    Integer,
    Float,
    Hex,
    String,
    Enumeration,
}

impl AttrKind {
    /// # Errors
    /// `UnsupportedValueKind` for anything but INT/FLOAT/HEX/STRING/ENUM.
    pub fn from_keyword(keyword: &str) -> DbcResult<Self> {
        match keyword {
            "INT" => Ok(AttrKind::Integer),
            "FLOAT" => Ok(AttrKind::Float),
            "HEX" => Ok(AttrKind::Hex),
            "STRING" => Ok(AttrKind::String),
            "ENUM" => Ok(AttrKind::Enumeration),
            other => Err(DbcError::UnsupportedValueKind(other.to_owned())),
        }
    }

    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            AttrKind::Integer => "INT",
            AttrKind::Float => "FLOAT",
            AttrKind::Hex => "HEX",
            AttrKind::String => "STRING",
            AttrKind::Enumeration => "ENUM",
        }
    }
}

/// Well-known enumerations: canonical casing, position is the canonical ordinal.
const WELL_KNOWN_ENUMS: [(&str, &[&str]); 11] = [
    (
        "GenMsgSendType",
        &[
            "cyclic",
            "reserved",
            "cyclicIfActive",
            "reserved",
            "reserved",
            "reserved",
            "reserved",
            "reserved",
            "noMsgSendType",
        ],
    ),
    (
        "GenSigSendType",
        &[
            "cyclic",
            "OnChange",
            "OnWrite",
            "IfActive",
            "OnChangeWithRepetition",
            "OnWriteWithRepetition",
            "IfActiveWithRepetition",
            "NoSigSendtype",
        ],
    ),
    ("VFrameFormat", &["StandardCAN", "ExtendedCAN", "reserved", "J1939PG"]),
    (
        "SigType",
        &[
            "Default",
            "Range",
            "RangeSigned",
            "ASCII",
            "Discrete",
            "Control",
            "ReferencePGN",
            "DTC",
            "StringDelimiter",
            "StringLength",
            "StringLengthControl",
        ],
    ),
    ("DiagRequest", &["No", "Yes"]),
    ("DiagResponse", &["No", "Yes"]),
    ("DiagState", &["No", "Yes"]),
    ("NmMessage", &["No", "Yes"]),
    ("GenMsgILSupport", &["Yes", "No"]),
    ("ILUsed", &["No", "Yes"]),
    ("NmNode", &["Not", "Yes"]),
];

/// Definitions that are tracked but never written back.
const SUPPRESSED_DEFINITIONS: [&str; 1] = ["SystemSignalLongSymbol"];

fn canonical_table(name: &str) -> Option<Vec<String>> {
    WELL_KNOWN_ENUMS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, labels)| labels.iter().map(|label| (*label).to_owned()).collect())
}

/// Comparison key: casing, blanks and underscores do not matter.
fn label_key(label: &str) -> String {
    label.to_lower_camel_case().to_lowercase()
}

pub(crate) fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    let raw = raw.strip_prefix('"').unwrap_or(raw);
    raw.strip_suffix('"').unwrap_or(raw)
}

/// Integer in decimal, `0x` hexadecimal or integral float notation.
pub(crate) fn parse_int(raw: &str) -> Option<i64> {
    let raw = unquote(raw).trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    let value = raw.parse::<f64>().ok().filter(|value| value.is_finite())?;
    if value.fract() != 0.0 {
        log::warn!("integer token '{}' truncated to {}", raw, value.trunc());
    }
    #[allow(clippy::cast_possible_truncation)]
    Some(value as i64)
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct AttributeDefinition {
    pub name: String,
    pub object: AttrObject,
    pub kind: AttrKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub default: Option<AttrValue>,
    /// false: kept in the model, never written
    pub emit: bool,
    /// merged enumeration labels, output indices refer to this list
    pub values: Vec<String>,
    /// enumeration labels of the source being parsed
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) source_values: Vec<String>,
    #[cfg_attr(feature = "serde", serde(skip))]
    canonical: Option<Vec<String>>,
}

impl PartialEq for AttributeDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.object == other.object
            && self.kind == other.kind
            && self.min == other.min
            && self.max == other.max
            && self.default == other.default
            && self.emit == other.emit
            && self.values == other.values
    }
}

impl AttributeDefinition {
    #[must_use]
    pub fn new(name: &str, object: AttrObject, kind: AttrKind) -> Self {
        AttributeDefinition {
            name: name.to_owned(),
            object,
            kind,
            min: None,
            max: None,
            default: None,
            emit: true,
            values: Vec::new(),
            source_values: Vec::new(),
            canonical: canonical_table(name),
        }
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn default_value(mut self, value: AttrValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn enum_values(mut self, values: &[&str]) -> Self {
        let values: Vec<String> = values.iter().map(|value| (*value).to_owned()).collect();
        self.union_values(&values);
        self
    }

    pub fn emit(mut self, flag: bool) -> Self {
        self.emit = flag;
        self
    }

    #[must_use]
    pub fn is_well_known(&self) -> bool {
        self.canonical.is_some()
    }

    /// Canonical casing of a label, unknown labels join the canonical table.
    pub fn normalize_label(&mut self, label: &str) -> String {
        let Some(canonical) = self.canonical.as_mut() else {
            return label.to_owned();
        };
        let key = label_key(label);
        if let Some(known) = canonical.iter().find(|known| label_key(known) == key) {
            return known.clone();
        }
        log::debug!("attribute:{} new enumeration label '{}'", self.name, label);
        canonical.push(label.to_owned());
        label.to_owned()
    }

    /// Union `incoming` into the merged list, canonical order for well-known names.
    ///
    /// A label repeated by a well-known table (placeholder slots) is kept as
    /// many times as one source declared it, never more.
    pub fn union_values(&mut self, incoming: &[String]) {
        let repeats = self.canonical.is_some();
        let mut merged = std::mem::take(&mut self.values);
        let mut declared: Vec<String> = Vec::new();
        for label in incoming {
            let label = self.normalize_label(label);
            if label.is_empty() {
                continue;
            }
            declared.push(label.clone());
            let wanted = if repeats { declared.iter().filter(|known| **known == label).count() } else { 1 };
            if merged.iter().filter(|known| **known == label).count() < wanted {
                merged.push(label);
            }
        }

        self.values = match &self.canonical {
            Some(canonical) => canonical
                .iter()
                .filter(|label| match merged.iter().position(|known| known == *label) {
                    Some(index) => {
                        merged.remove(index);
                        true
                    }
                    None => false,
                })
                .cloned()
                .collect(),
            None => merged,
        };
    }

    /// Position of a label in the merged list, the index written to output.
    #[must_use]
    pub fn output_index(&self, label: &str) -> Option<usize> {
        self.values.iter().position(|value| value == label)
    }

    /// Convert a raw token (bare number or quoted text) to a typed value.
    ///
    /// # Errors
    /// `MalformedRecord` (line 0) when the token does not fit the kind or an
    /// enumeration index is out of the current source list.
    pub fn convert(&mut self, raw: &str) -> DbcResult<AttrValue> {
        match self.kind {
            AttrKind::Integer => parse_int(raw)
                .map(AttrValue::Integer)
                .ok_or_else(|| self.bad_token(raw)),
            AttrKind::Hex => parse_int(raw).map(AttrValue::Hex).ok_or_else(|| self.bad_token(raw)),
            AttrKind::Float => unquote(raw)
                .trim()
                .parse::<f64>()
                .map(AttrValue::Float)
                .map_err(|_| self.bad_token(raw)),
            AttrKind::String => Ok(AttrValue::String(unquote(raw).to_owned())),
            AttrKind::Enumeration => {
                let token = raw.trim();
                let label = if !token.is_empty() && token.chars().all(|chr| chr.is_ascii_digit()) {
                    let index: usize = token.parse().map_err(|_| self.bad_token(raw))?;
                    match self.source_values.get(index) {
                        Some(label) => label.clone(),
                        None => {
                            return Err(DbcError::malformed(
                                0,
                                format!(
                                    "attribute:{} enum index {} out of {} values",
                                    self.name,
                                    index,
                                    self.source_values.len()
                                ),
                            ))
                        }
                    }
                } else {
                    unquote(token).to_owned()
                };

                if label.is_empty() {
                    return Ok(AttrValue::Enum(label));
                }
                let label = self.normalize_label(&label);
                if !self.values.contains(&label) {
                    self.union_values(std::slice::from_ref(&label));
                }
                Ok(AttrValue::Enum(label))
            }
        }
    }

    fn bad_token(&self, raw: &str) -> DbcError {
        DbcError::malformed(
            0,
            format!("attribute:{} invalid {} value '{}'", self.name, self.kind.keyword(), raw),
        )
    }
}

/// Definitions every fresh network starts with.
#[must_use]
pub fn builtin_definitions() -> Vec<AttributeDefinition> {
    use AttrKind::{Enumeration, Hex, Integer, String as Text};
    use AttrObject::{Message, Network as Net, Node, Signal};

    let no_yes = ["No", "Yes"];
    let mut defs = vec![
        AttributeDefinition::new("DiagRequest", Message, Enumeration)
            .enum_values(&no_yes)
            .default_value(AttrValue::Enum("No".into())),
        AttributeDefinition::new("DiagResponse", Message, Enumeration)
            .enum_values(&no_yes)
            .default_value(AttrValue::Enum("No".into())),
        AttributeDefinition::new("DiagState", Message, Enumeration)
            .enum_values(&no_yes)
            .default_value(AttrValue::Enum("No".into())),
        AttributeDefinition::new("GenMsgSendType", Message, Enumeration)
            .enum_values(&[
                "cyclic",
                "reserved",
                "cyclicIfActive",
                "reserved",
                "reserved",
                "reserved",
                "reserved",
                "reserved",
                "noMsgSendType",
            ])
            .default_value(AttrValue::Enum("noMsgSendType".into())),
        AttributeDefinition::new("GenMsgCycleTime", Message, Integer)
            .range(0.0, 0.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("GenMsgCycleTimeActive", Message, Integer)
            .range(0.0, 0.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("GenMsgCycleTimeFast", Message, Integer)
            .range(0.0, 0.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("GenMsgDelayTime", Message, Integer)
            .range(0.0, 0.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("GenMsgILSupport", Message, Enumeration)
            .enum_values(&["Yes", "No"])
            .default_value(AttrValue::Enum("No".into())),
        AttributeDefinition::new("GenMsgNrOfRepetition", Message, Integer)
            .range(0.0, 0.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("GenMsgStartDelayTime", Message, Integer)
            .range(0.0, 65535.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("NmMessage", Message, Enumeration)
            .enum_values(&no_yes)
            .default_value(AttrValue::Enum("No".into())),
        AttributeDefinition::new("BusType", Net, Text).default_value(AttrValue::String("CAN".into())),
        AttributeDefinition::new("Manufacturer", Net, Text).default_value(AttrValue::String(String::new())),
        AttributeDefinition::new("NmBaseAddress", Net, Hex)
            .range(0.0, f64::from(0x7FF))
            .default_value(AttrValue::Hex(0x400)),
        AttributeDefinition::new("NmMessageCount", Net, Integer)
            .range(0.0, 255.0)
            .default_value(AttrValue::Integer(128)),
        AttributeDefinition::new("NmType", Net, Text).default_value(AttrValue::String(String::new())),
        AttributeDefinition::new("DBName", Net, Text).default_value(AttrValue::String("CAN".into())),
        AttributeDefinition::new("DatabaseVersion", Net, Integer)
            .range(0.0, 0.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("ProtocolType", Net, Text).default_value(AttrValue::String("J1939".into())),
        AttributeDefinition::new("SAE_J1939_75_SpecVersion", Net, Text)
            .default_value(AttrValue::String(String::new())),
        AttributeDefinition::new("SAE_J1939_21_SpecVersion", Net, Text)
            .default_value(AttrValue::String(String::new())),
        AttributeDefinition::new("SAE_J1939_73_SpecVersion", Net, Text)
            .default_value(AttrValue::String(String::new())),
        AttributeDefinition::new("SAE_J1939_71_SpecVersion", Net, Text)
            .default_value(AttrValue::String(String::new())),
        AttributeDefinition::new("DiagStationAddress", Node, Hex)
            .range(0.0, 255.0)
            .default_value(AttrValue::Hex(0)),
        AttributeDefinition::new("ILUsed", Node, Enumeration)
            .enum_values(&no_yes)
            .default_value(AttrValue::Enum("No".into())),
        AttributeDefinition::new("NmCAN", Node, Integer)
            .range(0.0, 2.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("NmNode", Node, Enumeration)
            .enum_values(&["Not", "Yes"])
            .default_value(AttrValue::Enum("Not".into())),
        AttributeDefinition::new("NmStationAddress", Node, Hex)
            .range(0.0, 255.0)
            .default_value(AttrValue::Hex(0)),
        AttributeDefinition::new("NodeLayerModules", Node, Text)
            .default_value(AttrValue::String("CANoeILNVector.dll".into())),
        AttributeDefinition::new("SigType", Signal, Enumeration)
            .enum_values(&[
                "Default",
                "Range",
                "RangeSigned",
                "ASCII",
                "Discrete",
                "Control",
                "ReferencePGN",
                "DTC",
                "StringDelimiter",
                "StringLength",
                "StringLengthControl",
            ])
            .default_value(AttrValue::Enum(String::new())),
        AttributeDefinition::new("GenSigInactiveValue", Signal, Integer)
            .range(0.0, 0.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("GenSigSendType", Signal, Enumeration)
            .enum_values(&[
                "cyclic",
                "OnChange",
                "OnWrite",
                "IfActive",
                "OnChangeWithRepetition",
                "OnWriteWithRepetition",
                "IfActiveWithRepetition",
                "NoSigSendtype",
            ])
            .default_value(AttrValue::Enum(String::new())),
        AttributeDefinition::new("GenSigStartValue", Signal, Integer)
            .range(0.0, 0.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("GenSigTimeoutValue", Signal, Integer)
            .range(0.0, 1_000_000_000.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("SPN", Signal, Integer)
            .range(0.0, 524_287.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("DDI", Signal, Integer)
            .range(0.0, 65535.0)
            .default_value(AttrValue::Integer(0)),
        AttributeDefinition::new("SAEDocument", Signal, Text).default_value(AttrValue::String("J1939".into())),
        AttributeDefinition::new("VFrameFormat", Message, Enumeration)
            .enum_values(&["StandardCAN", "ExtendedCAN", "reserved", "J1939PG"])
            .default_value(AttrValue::Enum("ExtendedCAN".into())),
        AttributeDefinition::new("SystemSignalLongSymbol", Signal, Text)
            .default_value(AttrValue::String("STRING".into())),
    ];

    for def in &mut defs {
        def.source_values = def.values.clone();
        if SUPPRESSED_DEFINITIONS.contains(&def.name.as_str()) {
            def.emit = false;
        }
    }
    defs
}

impl Network {
    /// Built-in definition `name`, registered first when the network lacks it.
    pub(crate) fn builtin_def_mut(&mut self, name: &str) -> DbcResult<&mut AttributeDefinition> {
        if self.attribute_def(name).is_none() {
            let mut def = builtin_definitions()
                .into_iter()
                .find(|def| def.name == name)
                .ok_or_else(|| DbcError::UnknownAttribute(name.to_owned()))?;
            def.source_values = def.values.clone();
            self.attribute_defs.push(def);
        }
        self.attribute_def_mut(name).ok_or_else(|| DbcError::UnknownAttribute(name.to_owned()))
    }

    /// Definition lookup, names compare case-insensitively.
    #[must_use]
    pub fn attribute_def(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attribute_defs.iter().find(|def| def.name.eq_ignore_ascii_case(name))
    }

    pub fn attribute_def_mut(&mut self, name: &str) -> Option<&mut AttributeDefinition> {
        self.attribute_defs.iter_mut().find(|def| def.name.eq_ignore_ascii_case(name))
    }

    /// Create a definition or update the existing one, later sources win.
    ///
    /// Empty fields (`None`, empty list) never overwrite, the `emit` flag is
    /// left untouched, enumeration lists are unioned. `values` also becomes
    /// the list used to decode indices of the current source.
    #[allow(clippy::too_many_arguments)]
    pub fn register_or_update(
        &mut self,
        name: &str,
        object: AttrObject,
        kind: AttrKind,
        min: Option<f64>,
        max: Option<f64>,
        default: Option<AttrValue>,
        values: &[String],
    ) -> &mut AttributeDefinition {
        let idx = match self.attribute_defs.iter().position(|def| def.name.eq_ignore_ascii_case(name)) {
            Some(idx) => {
                log::debug!("override attribute definition '{}'", name);
                let def = &mut self.attribute_defs[idx];
                def.object = object;
                def.kind = kind;
                idx
            }
            None => {
                let mut def = AttributeDefinition::new(name, object, kind);
                if SUPPRESSED_DEFINITIONS.contains(&name) {
                    def.emit = false;
                }
                self.attribute_defs.push(def);
                self.attribute_defs.len() - 1
            }
        };

        let def = &mut self.attribute_defs[idx];
        if min.is_some() {
            def.min = min;
        }
        if max.is_some() {
            def.max = max;
        }
        if default.is_some() {
            def.default = default;
        }
        if !values.is_empty() {
            let source: Vec<String> = values.iter().map(|label| def.normalize_label(label)).collect();
            def.union_values(&source);
            def.source_values = source;
        }
        def
    }

    /// Convert a raw token for attribute `name`.
    ///
    /// # Errors
    /// `UnknownAttribute` when `name` has no definition, `MalformedRecord`
    /// when the token does not fit the definition.
    pub fn convert(&mut self, name: &str, raw: &str) -> DbcResult<AttrValue> {
        match self.attribute_def_mut(name) {
            Some(def) => def.convert(raw),
            None => Err(DbcError::UnknownAttribute(name.to_owned())),
        }
    }

    /// Set the default of an existing definition from a raw token.
    ///
    /// # Errors
    /// Same as [`Network::convert`].
    pub fn set_attribute_default(&mut self, name: &str, raw: &str) -> DbcResult<()> {
        let value = self.convert(name, raw)?;
        if let Some(def) = self.attribute_def_mut(name) {
            def.default = Some(value);
        }
        Ok(())
    }

    /// Every new source decodes enum indices against the merged lists until
    /// it declares its own.
    pub(crate) fn begin_source(&mut self) {
        for def in &mut self.attribute_defs {
            def.source_values = def.values.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let error = AttrKind::from_keyword("BOOL").unwrap_err();
        assert!(matches!(error, DbcError::UnsupportedValueKind(kind) if kind == "BOOL"));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let mut network = Network::default();
        let error = network.convert("Missing", "1").unwrap_err();
        assert!(matches!(error, DbcError::UnknownAttribute(name) if name == "Missing"));
    }

    #[test]
    fn enum_index_uses_source_list() {
        let mut network = Network::default();
        network.register_or_update(
            "Mode",
            AttrObject::Message,
            AttrKind::Enumeration,
            None,
            None,
            None,
            &labels(&["Off", "On"]),
        );
        // second source orders its list differently
        network.register_or_update(
            "Mode",
            AttrObject::Message,
            AttrKind::Enumeration,
            None,
            None,
            None,
            &labels(&["On", "Standby", "Off"]),
        );
        assert_eq!(network.convert("Mode", "0").unwrap(), AttrValue::Enum("On".into()));
        assert_eq!(network.convert("Mode", "1").unwrap(), AttrValue::Enum("Standby".into()));
        let def = network.attribute_def("mode").unwrap();
        assert_eq!(def.values, labels(&["Off", "On", "Standby"]));
        assert_eq!(def.output_index("Standby"), Some(2));
        assert!(network.convert("Mode", "7").is_err());
    }

    #[test]
    fn well_known_labels_are_canonical() {
        let mut network = Network::default();
        network.register_or_update(
            "VFrameFormat",
            AttrObject::Message,
            AttrKind::Enumeration,
            None,
            None,
            None,
            &labels(&["J1939PG", "extended_can", "StandardCAN_FD"]),
        );
        network.register_or_update(
            "VFrameFormat",
            AttrObject::Message,
            AttrKind::Enumeration,
            None,
            None,
            None,
            &labels(&["StandardCan", "J1939PG"]),
        );
        let def = network.attribute_def("VFrameFormat").unwrap();
        assert!(def.is_well_known());
        assert_eq!(def.values, labels(&["StandardCAN", "ExtendedCAN", "J1939PG", "StandardCAN_FD"]));
        assert_eq!(
            network.convert("VFrameFormat", "\"extendedCAN\"").unwrap(),
            AttrValue::Enum("ExtendedCAN".into())
        );
    }

    #[test]
    fn update_keeps_non_empty_fields_and_emit_flag() {
        let mut network = Network::new();
        assert!(!network.attribute_def("SystemSignalLongSymbol").unwrap().emit);
        network.register_or_update(
            "SystemSignalLongSymbol",
            AttrObject::Signal,
            AttrKind::String,
            None,
            None,
            None,
            &[],
        );
        let def = network.attribute_def("SystemSignalLongSymbol").unwrap();
        assert!(!def.emit);
        assert_eq!(def.default, Some(AttrValue::String("STRING".into())));

        network.register_or_update(
            "GenMsgStartDelayTime",
            AttrObject::Message,
            AttrKind::Integer,
            Some(0.0),
            Some(1000.0),
            None,
            &[],
        );
        let def = network.attribute_def("GenMsgStartDelayTime").unwrap();
        assert_eq!(def.max, Some(1000.0));
        assert_eq!(def.default, Some(AttrValue::Integer(0)));
    }

    #[test]
    fn builtin_send_type_keeps_reserved_slots() {
        let network = Network::new();
        let def = network.attribute_def("GenMsgSendType").unwrap();
        assert_eq!(def.values.len(), 9);
        assert_eq!(def.output_index("noMsgSendType"), Some(8));
    }

    #[test]
    fn send_type_keeps_only_declared_placeholders() {
        let mut network = Network::default();
        network.register_or_update(
            "GenMsgSendType",
            AttrObject::Message,
            AttrKind::Enumeration,
            None,
            None,
            None,
            &labels(&["Cyclic", "reserved", "noMsgSendType"]),
        );
        let def = network.attribute_def("GenMsgSendType").unwrap();
        assert_eq!(def.values, labels(&["cyclic", "reserved", "noMsgSendType"]));

        // a later source with two placeholders grows the list to two, not more
        network.register_or_update(
            "GenMsgSendType",
            AttrObject::Message,
            AttrKind::Enumeration,
            None,
            None,
            None,
            &labels(&["cyclic", "reserved", "cyclicIfActive", "reserved"]),
        );
        let def = network.attribute_def("GenMsgSendType").unwrap();
        assert_eq!(def.values, labels(&["cyclic", "reserved", "cyclicIfActive", "reserved", "noMsgSendType"]));
    }

    #[test]
    fn fractional_integer_token_is_truncated() {
        let mut def = AttributeDefinition::new("Cycle", AttrObject::Message, AttrKind::Integer);
        assert_eq!(def.convert("1.9").unwrap(), AttrValue::Integer(1));
        assert_eq!(def.convert("20.0").unwrap(), AttrValue::Integer(20));
    }

    #[test]
    fn numeric_conversions() {
        let mut def = AttributeDefinition::new("Cycle", AttrObject::Message, AttrKind::Integer);
        assert_eq!(def.convert("100").unwrap(), AttrValue::Integer(100));
        assert_eq!(def.convert("0x10").unwrap(), AttrValue::Integer(16));
        assert!(def.convert("fast").is_err());

        let mut def = AttributeDefinition::new("Ratio", AttrObject::Signal, AttrKind::Float);
        assert_eq!(def.convert("0.5").unwrap(), AttrValue::Float(0.5));

        let mut def = AttributeDefinition::new("Doc", AttrObject::Signal, AttrKind::String);
        assert_eq!(def.convert("\"J1939\"").unwrap(), AttrValue::String("J1939".into()));
    }
}
