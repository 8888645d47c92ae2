/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
 * Reference: http://mcu.so/Microcontroller/Automotive/dbc-file-format-documentation_compress.pdf
 */

use crate::attribute::{builtin_definitions, AttributeDefinition};
use indexmap::IndexMap;
use std::fmt;
use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sentinel node name used when a message has no sender or a signal no receiver.
pub const VECTOR_XXX: &str = "Vector__XXX";

/// Message holding independent signals that do not belong to any frame.
pub const INDEPENDENT_SIG_MSG: &str = "VECTOR__INDEPENDENT_SIG_MSG";

/// Ordered integer -> label table.
pub type ValueDescriptions = IndexMap<i64, String>;

/// Attribute name -> typed value.
pub type AttrMap = IndexMap<String, AttrValue>;

/// CAN id as written in the DBC (bit 31 flags extended frames).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u32);

impl MessageId {
    #[must_use]
    pub fn to_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, format: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(format, "{}", self.0)
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    #[must_use]
    pub fn from_digit(digit: char) -> Option<Self> {
        match digit {
            '1' => Some(ByteOrder::LittleEndian),
            '0' => Some(ByteOrder::BigEndian),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_digit(&self) -> char {
        match self {
            ByteOrder::LittleEndian => '1',
            ByteOrder::BigEndian => '0',
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueType {
    Signed,
    Unsigned,
}

impl ValueType {
    #[must_use]
    pub fn as_char(&self) -> char {
        match self {
            ValueType::Signed => '-',
            ValueType::Unsigned => '+',
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MultiplexIndicator {
    /// Multiplexor switch
    Multiplexor,
    /// Signal us being multiplexed by the multiplexer switch.
    MultiplexedSignal(u64),
    /// Signal us being multiplexed by the multiplexer switch and itself is a multiplexor
    MultiplexorAndMultiplexedSignal(u64),
    /// Normal signal
    Plain,
}

impl fmt::Display for MultiplexIndicator {
    fn fmt(&self, format: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultiplexIndicator::Plain => Ok(()),
            MultiplexIndicator::Multiplexor => write!(format, "M"),
            MultiplexIndicator::MultiplexedSignal(value) => write!(format, "m{value}"),
            MultiplexIndicator::MultiplexorAndMultiplexedSignal(value) => {
                write!(format, "m{value}M")
            }
        }
    }
}

/// `SIG_VALTYPE_` tag.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SignalExtendedValueType {
    #[default]
    SignedOrUnsignedInteger,
    IEEEfloat32Bit,
    IEEEdouble64bit,
}

impl SignalExtendedValueType {
    #[must_use]
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(SignalExtendedValueType::SignedOrUnsignedInteger),
            1 => Some(SignalExtendedValueType::IEEEfloat32Bit),
            2 => Some(SignalExtendedValueType::IEEEdouble64bit),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_code(&self) -> u64 {
        match self {
            SignalExtendedValueType::SignedOrUnsignedInteger => 0,
            SignalExtendedValueType::IEEEfloat32Bit => 1,
            SignalExtendedValueType::IEEEdouble64bit => 2,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Transmitter {
    /// node transmitting the message
    NodeName(String),
    /// message has no sender
    #[default]
    VectorXXX,
}

impl Transmitter {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.is_empty() || name == VECTOR_XXX {
            Transmitter::VectorXXX
        } else {
            Transmitter::NodeName(name.to_owned())
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Transmitter::NodeName(name) => name.as_str(),
            Transmitter::VectorXXX => VECTOR_XXX,
        }
    }

    #[must_use]
    pub fn is_node(&self) -> bool {
        matches!(self, Transmitter::NodeName(_))
    }
}

/// Typed attribute value, the kind follows the attribute definition.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Integer(i64),
    Float(f64),
    Hex(i64),
    String(String),
    /// enumeration label (never the source index)
    Enum(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, format: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Integer(value) | AttrValue::Hex(value) => write!(format, "{value}"),
            AttrValue::Float(value) => write!(format, "{}", fmt_number(*value)),
            AttrValue::String(value) | AttrValue::Enum(value) => write!(format, "{value}"),
        }
    }
}

/// Render a float the way DBC tools do: `1` rather than `1.0`.
#[must_use]
pub fn fmt_number(value: f64) -> String {
    if value == 0.0 {
        // also folds -0.0
        return "0".to_owned();
    }
    format!("{value}")
}

/// Environment variable type tag (`EV_ name: <tag> ...`).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum EnvType {
    #[default]
    Integer,
    Float,
    String,
}

impl EnvType {
    #[must_use]
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(EnvType::Integer),
            1 => Some(EnvType::Float),
            2 => Some(EnvType::String),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_code(&self) -> u64 {
        match self {
            EnvType::Integer => 0,
            EnvType::Float => 1,
            EnvType::String => 2,
        }
    }
}

/// Semantic form of the `DUMMY_NODE_VECTORn` access token.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum AccessType {
    #[default]
    Unrestricted,
    Read,
    Write,
    ReadWrite,
}

impl AccessType {
    /// bit 15 of the vector code only flags string variables
    #[must_use]
    pub fn from_vector(code: u32) -> Self {
        match code & 0x3 {
            1 => AccessType::Read,
            2 => AccessType::Write,
            3 => AccessType::ReadWrite,
            _ => AccessType::Unrestricted,
        }
    }

    #[must_use]
    pub fn to_vector(&self, env_type: EnvType) -> String {
        let code = match self {
            AccessType::Unrestricted => 0,
            AccessType::Read => 1,
            AccessType::Write => 2,
            AccessType::ReadWrite => 3,
        };
        let code = if env_type == EnvType::String { code | 0x8000 } else { code };
        format!("DUMMY_NODE_VECTOR{code:X}")
    }
}

/// How `add_signal` decides that two signals of a message are the same one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SignalMatch {
    /// start bit, size, sign and multiplexing
    Structural,
    /// same as structural plus an equal name
    StructuralAndName,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Node {
    pub name: String,
    pub comment: String,
    pub attributes: AttrMap,
}

impl Node {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Node { name: name.to_owned(), ..Node::default() }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct Signal {
    pub name: String,
    pub multiplexer_indicator: MultiplexIndicator,
    pub start_bit: u64,
    pub size: u64,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    pub extended_value_type: SignalExtendedValueType,
    pub factor: f64,
    pub offset: f64,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    pub values: ValueDescriptions,
    /// real node names only, the sentinel is implied when empty
    pub receivers: Vec<String>,
    pub comment: String,
    pub attributes: AttrMap,
    /// names of signals absorbed by a structural merge
    #[cfg_attr(feature = "serde", serde(skip))]
    pub aliases: Vec<String>,
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.multiplexer_indicator == other.multiplexer_indicator
            && self.start_bit == other.start_bit
            && self.size == other.size
            && self.byte_order == other.byte_order
            && self.value_type == other.value_type
            && self.extended_value_type == other.extended_value_type
            && self.factor == other.factor
            && self.offset == other.offset
            && self.min == other.min
            && self.max == other.max
            && self.unit == other.unit
            && self.values == other.values
            && self.receivers == other.receivers
            && self.comment == other.comment
            && self.attributes == other.attributes
    }
}

impl Signal {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Signal {
            name: name.to_owned(),
            multiplexer_indicator: MultiplexIndicator::Plain,
            start_bit: 0,
            size: 1,
            byte_order: ByteOrder::BigEndian,
            value_type: ValueType::Unsigned,
            extended_value_type: SignalExtendedValueType::SignedOrUnsignedInteger,
            factor: 1.0,
            offset: 0.0,
            min: 0.0,
            max: 1.0,
            unit: String::new(),
            values: ValueDescriptions::new(),
            receivers: Vec::new(),
            comment: String::new(),
            attributes: AttrMap::new(),
            aliases: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|alias| alias == name)
    }

    /// Structural identity, optionally completed by the name.
    #[must_use]
    pub fn same_as(&self, other: &Signal, strategy: SignalMatch) -> bool {
        let structural = self.start_bit == other.start_bit
            && self.size == other.size
            && self.value_type == other.value_type
            && self.multiplexer_indicator == other.multiplexer_indicator;
        match strategy {
            SignalMatch::Structural => structural,
            SignalMatch::StructuralAndName => structural && self.name == other.name,
        }
    }

    /// Whether the signal bits stay inside a frame of `msg_size` bytes.
    #[must_use]
    pub fn fits_in(&self, msg_size: u64) -> bool {
        let msg_bits = msg_size.saturating_mul(8);
        match self.byte_order {
            ByteOrder::LittleEndian => self.start_bit.saturating_add(self.size) <= msg_bits,
            ByteOrder::BigEndian => {
                // motorola start bit is the msb, walk back to the lsb position
                let msb = (self.start_bit / 8) * 8 + (7 - self.start_bit % 8);
                msb.saturating_add(self.size) <= msg_bits
            }
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SignalGroup {
    pub name: String,
    pub repetitions: u64,
    pub signal_names: Vec<String>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub name: String,
    pub size: u64,
    pub sender: Transmitter,
    pub send_type: String,
    pub signals: Vec<Signal>,
    pub attributes: AttrMap,
    pub receivers: Vec<String>,
    pub transmitters: Vec<String>,
    pub comment: String,
    pub signal_groups: Vec<SignalGroup>,
}

impl Message {
    #[must_use]
    pub fn new(id: u32, name: &str, size: u64, sender: Transmitter) -> Self {
        Message {
            id: MessageId(id),
            name: name.to_owned(),
            size,
            sender,
            send_type: String::new(),
            signals: Vec::new(),
            attributes: AttrMap::new(),
            receivers: Vec::new(),
            transmitters: Vec::new(),
            comment: String::new(),
            signal_groups: Vec::new(),
        }
    }

    /// Signal identity strategy, driven by the message role.
    #[must_use]
    pub fn signal_match(&self) -> SignalMatch {
        if self.name == INDEPENDENT_SIG_MSG {
            SignalMatch::StructuralAndName
        } else {
            SignalMatch::Structural
        }
    }

    #[must_use]
    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|sig| sig.is_named(name))
    }

    pub fn signal_mut(&mut self, name: &str) -> Option<&mut Signal> {
        self.signals.iter_mut().find(|sig| sig.is_named(name))
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ValueTable {
    pub name: String,
    pub values: ValueDescriptions,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Default)]
pub struct EnvironmentVariable {
    pub name: String,
    pub env_type: EnvType,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    pub initial_value: f64,
    pub ev_id: u64,
    pub access_type: AccessType,
    pub access_nodes: Vec<String>,
    pub values: ValueDescriptions,
    pub comment: String,
    pub attributes: AttrMap,
}

/// One CAN network, possibly merged from several sources.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default)]
pub struct Network {
    pub version: String,
    pub nodes: Vec<Node>,
    pub messages: Vec<Message>,
    pub value_tables: Vec<ValueTable>,
    pub attribute_defs: Vec<AttributeDefinition>,
    /// network level attributes, raw text without quotes
    pub attributes: IndexMap<String, String>,
    pub environment_variables: Vec<EnvironmentVariable>,
    /// `SG_MUL_VAL_` records kept verbatim
    pub multiplexed_values: Vec<String>,
    pub comment: String,
    /// last loaded or imported source, used to derive the save path
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) source: Option<PathBuf>,
}

impl PartialEq for Network {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.nodes == other.nodes
            && self.messages == other.messages
            && self.value_tables == other.value_tables
            && self.attribute_defs == other.attribute_defs
            && self.attributes == other.attributes
            && self.environment_variables == other.environment_variables
            && self.multiplexed_values == other.multiplexed_values
            && self.comment == other.comment
    }
}

impl Network {
    /// Network seeded with the built-in attribute definitions and `DBName`.
    #[must_use]
    pub fn new() -> Self {
        let mut network = Network { attribute_defs: builtin_definitions(), ..Network::default() };
        if let Some(default) = network.attribute_def("DBName").and_then(|def| def.default.clone()) {
            network.attributes.insert("DBName".to_owned(), default.to_string());
        }
        network
    }

    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|msg| msg.id == id)
    }

    pub fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|msg| msg.id == id)
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Node by name, created on first reference.
    pub fn node_or_insert(&mut self, name: &str) -> &mut Node {
        let idx = match self.nodes.iter().position(|node| node.name == name) {
            Some(idx) => idx,
            None => {
                self.nodes.push(Node::new(name));
                self.nodes.len() - 1
            }
        };
        &mut self.nodes[idx]
    }

    pub fn env_var_mut(&mut self, name: &str) -> Option<&mut EnvironmentVariable> {
        self.environment_variables.iter_mut().find(|env| env.name == name)
    }

    #[must_use]
    pub fn value_table(&self, name: &str) -> Option<&ValueTable> {
        self.value_tables.iter().find(|table| table.name == name)
    }

    /// Record the source the network was built from, used to derive the save path.
    pub fn set_source<P>(&mut self, path: P)
    where
        P: Into<PathBuf>,
    {
        self.source = Some(path.into());
    }

    /// Name of the last loaded source, if any.
    #[must_use]
    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }
}
