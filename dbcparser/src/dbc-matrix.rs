/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

//! CAN matrix import from already decoded spreadsheet rows.
//!
//! A row naming a message opens it, following rows naming a signal belong to
//! the last opened message. One column per ECU carries `S` (sender) or `R`
//! (receiver).

use crate::attribute::parse_int;
use crate::data::*;
use crate::error::{DbcError, DbcResult};
use crate::merge::SortKey;
use indexmap::IndexMap;

/// Node names longer than this are not node columns.
const NODE_NAME_MAX: usize = 16;

/// One decoded spreadsheet cell.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        if text.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(text.to_owned())
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl Cell {
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(text) => text.clone(),
            Cell::Number(value) => fmt_number(*value),
        }
    }

    /// Decimal first, then hexadecimal with or without `0x`.
    #[must_use]
    pub fn int(&self) -> Option<i64> {
        match self {
            Cell::Empty => None,
            #[allow(clippy::cast_possible_truncation)]
            Cell::Number(value) if value.fract() == 0.0 => Some(*value as i64),
            Cell::Number(_) => None,
            Cell::Text(text) => {
                let text = text.trim();
                parse_int(text).or_else(|| i64::from_str_radix(text, 16).ok())
            }
        }
    }

    #[must_use]
    pub fn float(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(value) => Some(*value),
            Cell::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Meaning of a matrix column.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    MsgName,
    MsgType,
    MsgId,
    MsgSendType,
    MsgCycleTime,
    MsgLength,
    SignalName,
    MultiplexerIndicator,
    Description,
    ByteOrder,
    StartBit,
    BitLength,
    DataType,
    Resolution,
    Offset,
    SignalMin,
    SignalMax,
    InitialValue,
    Unit,
    SignalValueDescription,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 20] = [
        ColumnRole::MsgName,
        ColumnRole::MsgType,
        ColumnRole::MsgId,
        ColumnRole::MsgSendType,
        ColumnRole::MsgCycleTime,
        ColumnRole::MsgLength,
        ColumnRole::SignalName,
        ColumnRole::MultiplexerIndicator,
        ColumnRole::Description,
        ColumnRole::ByteOrder,
        ColumnRole::StartBit,
        ColumnRole::BitLength,
        ColumnRole::DataType,
        ColumnRole::Resolution,
        ColumnRole::Offset,
        ColumnRole::SignalMin,
        ColumnRole::SignalMax,
        ColumnRole::InitialValue,
        ColumnRole::Unit,
        ColumnRole::SignalValueDescription,
    ];

    /// Header text (blanks removed) identifying the column.
    #[must_use]
    pub fn header(&self) -> &'static str {
        match self {
            ColumnRole::MsgName => "MsgName",
            ColumnRole::MsgType => "MsgType",
            ColumnRole::MsgId => "MsgID",
            ColumnRole::MsgSendType => "MsgSendType",
            ColumnRole::MsgCycleTime => "MsgCycleTime",
            ColumnRole::MsgLength => "MsgLength",
            ColumnRole::SignalName => "SignalName",
            ColumnRole::MultiplexerIndicator => "MultiplexerIndicator",
            ColumnRole::Description => "Description",
            ColumnRole::ByteOrder => "ByteOrder",
            ColumnRole::StartBit => "StartBit",
            ColumnRole::BitLength => "BitLength",
            ColumnRole::DataType => "DataType",
            ColumnRole::Resolution => "Resolution",
            ColumnRole::Offset => "Offset",
            ColumnRole::SignalMin => "SignalMin.Value(phys)",
            ColumnRole::SignalMax => "SignalMax.Value(phys)",
            ColumnRole::InitialValue => "InitialValue(Hex)",
            ColumnRole::Unit => "Unit",
            ColumnRole::SignalValueDescription => "SignalValueDescription",
        }
    }
}

/// Column layout of a matrix sheet.
#[derive(Clone, Debug, Default)]
pub struct ColumnMap {
    columns: IndexMap<ColumnRole, usize>,
    nodes: IndexMap<String, usize>,
    start_row: usize,
}

impl ColumnMap {
    #[must_use]
    pub fn new(start_row: usize) -> Self {
        ColumnMap { start_row, ..ColumnMap::default() }
    }

    #[must_use]
    pub fn column(mut self, role: ColumnRole, col: usize) -> Self {
        self.columns.insert(role, col);
        self
    }

    /// Declare an ECU column.
    ///
    /// # Errors
    /// `DuplicateIdentity` when the node already owns a column.
    pub fn node(mut self, name: &str, col: usize) -> DbcResult<Self> {
        if self.nodes.contains_key(name) {
            return Err(DbcError::DuplicateIdentity(name.to_owned()));
        }
        self.nodes.insert(name.to_owned(), col);
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, role: ColumnRole) -> Option<usize> {
        self.columns.get(&role).copied()
    }

    #[must_use]
    pub fn nodes(&self) -> &IndexMap<String, usize> {
        &self.nodes
    }

    #[must_use]
    pub fn start_row(&self) -> usize {
        self.start_row
    }

    /// Derive the layout from the header row, the last row whose first cell
    /// holds `MsgName`.
    ///
    /// # Errors
    /// `MalformedRecord` without header row, `DuplicateIdentity` when two
    /// ECU columns share a name.
    pub fn from_header(rows: &[Vec<Cell>]) -> DbcResult<Self> {
        let header_row = rows
            .iter()
            .rposition(|row| row.first().is_some_and(|cell| squeeze(&cell.text()).contains("MsgName")))
            .ok_or_else(|| DbcError::malformed(0, "no 'MsgName' header row in matrix"))?;
        let headers: Vec<String> = rows[header_row].iter().map(|cell| squeeze(&cell.text())).collect();

        let mut map = ColumnMap::new(header_row + 1);
        for (col, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let exact = ColumnRole::ALL.into_iter().find(|role| role.header() == header.as_str());
            let role = exact.or_else(|| {
                ColumnRole::ALL
                    .into_iter()
                    .find(|role| map.get(*role).is_none() && header.contains(role.header()))
            });
            if let Some(role) = role {
                if map.get(role).is_none() {
                    map.columns.insert(role, col);
                }
            }
        }

        let node_start = match map.get(ColumnRole::SignalValueDescription) {
            Some(col) => col + 1,
            None => map.columns.values().max().map_or(0, |col| col + 1),
        };
        for (col, header) in headers.iter().enumerate().skip(node_start) {
            if header.is_empty() || header.chars().count() > NODE_NAME_MAX {
                continue;
            }
            if map.columns.values().any(|used| *used == col) {
                continue;
            }
            map = map.node(header, col)?;
        }
        log::debug!("matrix header row:{} nodes:{:?}", header_row, map.nodes.keys());
        Ok(map)
    }
}

fn squeeze(text: &str) -> String {
    text.chars().filter(|chr| *chr != ' ').collect()
}

/// Comments end up inside a quoted DBC record.
fn sanitize(text: &str) -> String {
    text.replace('"', "'").replace(';', ",").replace('\r', "\n").replace("\n\n", "\n")
}

/// `0:Off;1:On` style cell, `None` when it does not hold pairs.
fn parse_value_cell(text: &str) -> Option<ValueDescriptions> {
    let tokens: Vec<&str> = text
        .trim()
        .split(|chr| chr == ';' || chr == ':' || chr == '\n')
        .filter(|token| !token.trim().is_empty())
        .collect();
    if tokens.len() < 2 || tokens.len() % 2 != 0 {
        return None;
    }
    let mut values = ValueDescriptions::new();
    for pair in tokens.chunks(2) {
        let key = Cell::Text(pair[0].to_owned()).int()?;
        values.insert(key, pair[1].replace('"', "").trim().to_owned());
    }
    Some(values)
}

struct RowReader<'a> {
    row: &'a [Cell],
    map: &'a ColumnMap,
    line: usize,
}

impl<'a> RowReader<'a> {
    fn cell(&self, role: ColumnRole) -> &'a Cell {
        const EMPTY: &Cell = &Cell::Empty;
        self.map.get(role).and_then(|col| self.row.get(col)).unwrap_or(EMPTY)
    }

    fn text(&self, role: ColumnRole) -> String {
        self.cell(role).text()
    }

    fn upper(&self, role: ColumnRole) -> String {
        self.text(role).trim().to_uppercase()
    }

    fn required_int(&self, role: ColumnRole) -> DbcResult<i64> {
        self.cell(role).int().ok_or_else(|| {
            DbcError::malformed(
                self.line,
                format!("column {} invalid integer '{}'", role.header(), self.text(role)),
            )
        })
    }

    fn float_or(&self, role: ColumnRole, default: f64) -> f64 {
        self.cell(role).float().unwrap_or(default)
    }

    fn node_mark(&self, col: usize) -> String {
        self.row.get(col).map(|cell| cell.text().trim().to_uppercase()).unwrap_or_default()
    }
}

fn to_u64(value: i64, line: usize, what: &str) -> DbcResult<u64> {
    u64::try_from(value).map_err(|_| DbcError::malformed(line, format!("negative {what} {value}")))
}

impl Network {
    fn set_builtin(&mut self, attributes: AttrSlot, name: &str, raw: &str) -> DbcResult<()> {
        let value = self.builtin_def_mut(name)?.convert(raw)?;
        let Some(msg) = self.messages.last_mut() else {
            return Ok(());
        };
        match attributes {
            AttrSlot::Message => msg.attributes.insert(name.to_owned(), value),
            AttrSlot::LastSignal => match msg.signals.last_mut() {
                Some(sig) => sig.attributes.insert(name.to_owned(), value),
                None => None,
            },
        };
        Ok(())
    }

    fn import_message(&mut self, reader: &RowReader<'_>) -> DbcResult<()> {
        let line = reader.line;
        let id = u32::try_from(reader.required_int(ColumnRole::MsgId)?)
            .map_err(|_| DbcError::malformed(line, "message id out of range"))?;
        let size = to_u64(reader.required_int(ColumnRole::MsgLength)?, line, "message length")?;
        let mut message = Message::new(id, &squeeze(&reader.text(ColumnRole::MsgName)), size, Transmitter::VectorXXX);
        message.comment = sanitize(&reader.text(ColumnRole::Description));

        for (node, col) in reader.map.nodes() {
            match reader.node_mark(*col).as_str() {
                "S" => message.sender = Transmitter::NodeName(node.clone()),
                "R" => message.receivers.push(node.clone()),
                _ => {}
            }
        }
        self.messages.push(message);

        let frame_format = match reader.upper(ColumnRole::MsgType).as_str() {
            "J1939 PG (EXT. ID)" => Some("J1939PG"),
            "CAN STANDARD" => Some("StandardCAN"),
            "CAN EXTENDED" => Some("ExtendedCAN"),
            _ => None,
        };
        if let Some(label) = frame_format {
            self.set_builtin(AttrSlot::Message, "VFrameFormat", label)?;
        }

        let send_type = reader.upper(ColumnRole::MsgSendType);
        let send_type = if send_type == "CYCLIC" || send_type == "CE" {
            let cycle = reader.cell(ColumnRole::MsgCycleTime).int().unwrap_or_else(|| {
                log::warn!(
                    "line:{} message cycle time '{}' is invalid, set to 0",
                    line,
                    reader.text(ColumnRole::MsgCycleTime)
                );
                0
            });
            self.set_builtin(AttrSlot::Message, "GenMsgCycleTime", &cycle.to_string())?;
            "cyclic"
        } else {
            "noMsgSendType"
        };
        self.set_builtin(AttrSlot::Message, "GenMsgSendType", send_type)?;
        if let Some(msg) = self.messages.last_mut() {
            msg.send_type = send_type.to_owned();
        }
        Ok(())
    }

    fn import_signal(&mut self, reader: &RowReader<'_>) -> DbcResult<()> {
        let line = reader.line;
        let Some(message) = self.messages.last_mut() else {
            return Err(DbcError::malformed(line, "signal row before any message row"));
        };

        let mut signal = Signal::new(&squeeze(&reader.text(ColumnRole::SignalName)));
        let mux = reader.text(ColumnRole::MultiplexerIndicator);
        signal.multiplexer_indicator = match mux.trim() {
            "" => MultiplexIndicator::Plain,
            "M" => MultiplexIndicator::Multiplexor,
            _ => {
                let value = reader.required_int(ColumnRole::MultiplexerIndicator)?;
                MultiplexIndicator::MultiplexedSignal(to_u64(value, line, "multiplexer value")?)
            }
        };
        signal.start_bit = to_u64(reader.required_int(ColumnRole::StartBit)?, line, "start bit")?;
        signal.size = to_u64(reader.required_int(ColumnRole::BitLength)?, line, "bit length")?;
        signal.byte_order = match reader.upper(ColumnRole::ByteOrder).as_str() {
            "INTEL" | "MOTOROLA LSB" => ByteOrder::LittleEndian,
            "MOTOROLA MSB" => ByteOrder::BigEndian,
            other => {
                return Err(DbcError::malformed(line, format!("unknown signal byte order '{other}'")));
            }
        };
        signal.value_type = if reader.upper(ColumnRole::DataType) == "UNSIGNED" {
            ValueType::Unsigned
        } else {
            ValueType::Signed
        };
        signal.factor = reader.float_or(ColumnRole::Resolution, signal.factor);
        signal.offset = reader.float_or(ColumnRole::Offset, signal.offset);
        signal.min = reader.float_or(ColumnRole::SignalMin, signal.min);
        signal.max = reader.float_or(ColumnRole::SignalMax, signal.max);
        signal.unit = reader.text(ColumnRole::Unit);
        signal.comment = sanitize(&reader.text(ColumnRole::Description));

        let description = reader.text(ColumnRole::SignalValueDescription);
        if !description.trim().is_empty() {
            match parse_value_cell(&description) {
                Some(values) => signal.values = values,
                None => log::debug!("line:{} signal:{} value table ignored", line, signal.name),
            }
        }

        for (node, col) in reader.map.nodes() {
            match reader.node_mark(*col).as_str() {
                "R" => signal.receivers.push(node.clone()),
                "S" if message.sender.is_node() => {
                    log::warn!("line:{} message:{} sender conflicts with signal node {}", line, message.name, node);
                }
                "S" => {
                    log::warn!("line:{} message:{} sender set to {} via signal", line, message.name, node);
                    message.sender = Transmitter::NodeName(node.clone());
                }
                _ => {}
            }
        }
        if signal.receivers.is_empty() {
            signal.receivers = message.receivers.clone();
        }
        message.signals.push(signal);

        let start_value = reader.cell(ColumnRole::InitialValue).int().unwrap_or(0);
        self.set_builtin(AttrSlot::LastSignal, "GenSigStartValue", &start_value.to_string())
    }

    /// Populate the network from matrix rows, messages end up sorted by id.
    ///
    /// # Errors
    /// `MalformedRecord` (line is the 1-based row) for rows that cannot be
    /// converted, `UnknownAttribute` never happens as built-in definitions
    /// are registered on demand.
    pub fn import_tabular(&mut self, rows: &[Vec<Cell>], map: &ColumnMap) -> DbcResult<()> {
        self.attributes.insert("DBName".to_owned(), "CAN".to_owned());
        for node in map.nodes().keys() {
            self.node_or_insert(node);
        }

        for (idx, row) in rows.iter().enumerate().skip(map.start_row()) {
            let reader = RowReader { row, map, line: idx + 1 };
            if !reader.text(ColumnRole::MsgName).trim().is_empty() {
                self.import_message(&reader)?;
            } else if !reader.text(ColumnRole::SignalName).trim().is_empty() {
                self.import_signal(&reader)?;
            }
        }

        self.sort(SortKey::Id);
        log::info!("matrix imported rows:{} messages:{}", rows.len(), self.messages.len());
        Ok(())
    }
}

/// Entity receiving a built-in attribute during import.
#[derive(Copy, Clone)]
enum AttrSlot {
    Message,
    LastSignal,
}
