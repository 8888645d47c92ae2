/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
 * Reference: http://mcu.so/Microcontroller/Automotive/dbc-file-format-documentation_compress.pdf
 */
use crate::attribute::{AttrKind, AttributeDefinition};
use crate::data::*;
use crate::error::{DbcError, DbcResult};

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const IDT0: &str = "";
const IDT1: &str = " ";
const IDT2: &str = "    ";

/// Symbols announced in the `NS_` section.
const NEW_SYMBOLS: [&str; 28] = [
    "NS_DESC_",
    "CM_",
    "BA_DEF_",
    "BA_",
    "VAL_",
    "CAT_DEF_",
    "CAT_",
    "FILTER",
    "BA_DEF_DEF_",
    "EV_DATA_",
    "ENVVAR_DATA_",
    "SGTYPE_",
    "SGTYPE_VAL_",
    "BA_DEF_SGTYPE_",
    "BA_SGTYPE_",
    "SIG_TYPE_REF_",
    "VAL_TABLE_",
    "SIG_GROUP_",
    "SIG_VALTYPE_",
    "SIGTYPE_VALTYPE_",
    "BO_TX_BU_",
    "BA_DEF_REL_",
    "BA_REL_",
    "BA_DEF_DEF_REL_",
    "BU_SG_REL_",
    "BU_EV_REL_",
    "BU_BO_REL_",
    "SG_MUL_VAL_",
];

macro_rules! dbc_output {
 ($code:ident, $indent:ident, $format:expr, $( $args:expr ),*) => {
    $code.output ($indent, format! ($format, $($args),*))
 };
 ($code:ident, $indent:ident, $format:expr) => {
    $code.output ($indent, $format)
 };
}

struct DbcWriter<W: Write> {
    outfd: W,
}

impl<W: Write> DbcWriter<W> {
    /// Write a line with indentation.
    fn output<T>(&mut self, indent: &str, text: T) -> io::Result<()>
    where
        T: AsRef<str>,
    {
        self.outfd.write_all(indent.as_bytes())?;
        self.outfd.write_all(text.as_ref().as_bytes())?;
        self.outfd.write_all(b"\n")
    }
}

fn quoted(text: &str) -> String {
    format!("\"{text}\"")
}

fn value_pairs(values: &ValueDescriptions) -> String {
    values
        .iter()
        .map(|(key, label)| format!("{} \"{}\"", key, label))
        .collect::<Vec<String>>()
        .join(" ")
}

fn receivers(names: &[String]) -> String {
    if names.is_empty() {
        VECTOR_XXX.to_owned()
    } else {
        names.join(",")
    }
}

/// Value token of a `BA_` record, enumerations as index in the merged list.
fn attribute_text(def: &AttributeDefinition, value: &AttrValue) -> Option<String> {
    match value {
        AttrValue::Enum(label) if label.is_empty() => {
            log::warn!("attribute:{} empty enumeration label not written", def.name);
            None
        }
        AttrValue::Enum(label) => match def.output_index(label) {
            Some(index) => Some(index.to_string()),
            None => {
                log::warn!("attribute:{} label '{}' missing from enumeration", def.name, label);
                None
            }
        },
        AttrValue::String(text) => Some(quoted(text)),
        other => Some(other.to_string()),
    }
}

/// Value token of a `BA_DEF_DEF_` record.
fn default_text(value: &AttrValue) -> String {
    match value {
        AttrValue::String(text) | AttrValue::Enum(text) => quoted(text),
        other => other.to_string(),
    }
}

/// Network attributes are kept raw, quote them according to their definition.
fn network_attribute_text(def: Option<&AttributeDefinition>, raw: &str) -> String {
    match def.map(|def| def.kind) {
        Some(AttrKind::Integer | AttrKind::Hex | AttrKind::Float) => raw.to_owned(),
        Some(AttrKind::Enumeration) if !raw.is_empty() && raw.chars().all(|chr| chr.is_ascii_digit()) => {
            raw.to_owned()
        }
        _ => quoted(raw),
    }
}

fn range_text(def: &AttributeDefinition) -> String {
    format!("{} {}", fmt_number(def.min.unwrap_or_default()), fmt_number(def.max.unwrap_or_default()))
}

impl Signal {
    fn gen_dbc_signal<W: Write>(&self, code: &mut DbcWriter<W>) -> io::Result<()> {
        let name = match self.multiplexer_indicator {
            MultiplexIndicator::Plain => self.name.clone(),
            indicator => format!("{} {}", self.name, indicator),
        };
        dbc_output!(
            code,
            IDT1,
            "SG_ {} : {}|{}@{}{} ({},{}) [{}|{}] \"{}\" {}",
            name,
            self.start_bit,
            self.size,
            self.byte_order.as_digit(),
            self.value_type.as_char(),
            fmt_number(self.factor),
            fmt_number(self.offset),
            fmt_number(self.min),
            fmt_number(self.max),
            self.unit,
            receivers(&self.receivers)
        )
    }
}

impl Message {
    fn gen_dbc_message<W: Write>(&self, code: &mut DbcWriter<W>) -> io::Result<()> {
        dbc_output!(code, IDT0, "BO_ {} {}: {} {}", self.id, self.name, self.size, self.sender.name())?;
        for signal in &self.signals {
            signal.gen_dbc_signal(code)?;
        }
        dbc_output!(code, IDT0, "")
    }
}

impl Network {
    fn emitted_definitions(&self, relation: bool) -> impl Iterator<Item = &AttributeDefinition> {
        self.attribute_defs.iter().filter(move |def| def.emit && def.object.is_relation() == relation)
    }

    fn emitted_definition(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attribute_def(name).filter(|def| def.emit)
    }

    fn gen_dbc_header<W: Write>(&self, code: &mut DbcWriter<W>) -> io::Result<()> {
        dbc_output!(code, IDT0, "VERSION {}", quoted(&self.version))?;
        dbc_output!(code, IDT0, "\n")?;
        dbc_output!(code, IDT0, "NS_ :")?;
        for symbol in NEW_SYMBOLS {
            dbc_output!(code, IDT2, symbol)?;
        }
        dbc_output!(code, IDT0, "")?;
        dbc_output!(code, IDT0, "BS_:")?;
        dbc_output!(code, IDT0, "")?;

        let mut nodes = vec!["BU_:"];
        nodes.extend(self.nodes.iter().map(|node| node.name.as_str()));
        dbc_output!(code, IDT0, nodes.join(" "))?;
        dbc_output!(code, IDT0, "\n")?;

        for table in &self.value_tables {
            dbc_output!(code, IDT0, "VAL_TABLE_ {} {} ;", table.name, value_pairs(&table.values))?;
        }
        dbc_output!(code, IDT0, "\n")
    }

    fn gen_dbc_frames<W: Write>(&self, code: &mut DbcWriter<W>) -> io::Result<()> {
        for message in &self.messages {
            message.gen_dbc_message(code)?;
        }
        dbc_output!(code, IDT0, "")?;

        for message in self.messages.iter().filter(|msg| !msg.transmitters.is_empty()) {
            dbc_output!(code, IDT0, "BO_TX_BU_ {} : {};", message.id, message.transmitters.join(","))?;
        }
        dbc_output!(code, IDT0, "")?;

        for env in &self.environment_variables {
            dbc_output!(
                code,
                IDT0,
                "EV_ {}: {} [{}|{}] \"{}\" {} {} {} {};",
                env.name,
                env.env_type.as_code(),
                fmt_number(env.min),
                fmt_number(env.max),
                env.unit,
                fmt_number(env.initial_value),
                env.ev_id,
                env.access_type.to_vector(env.env_type),
                receivers(&env.access_nodes)
            )?;
        }
        dbc_output!(code, IDT0, "")
    }

    fn gen_dbc_comments<W: Write>(&self, code: &mut DbcWriter<W>) -> io::Result<()> {
        if !self.comment.is_empty() {
            dbc_output!(code, IDT0, "CM_ \"{}\";", self.comment)?;
        }
        for node in self.nodes.iter().filter(|node| !node.comment.is_empty()) {
            dbc_output!(code, IDT0, "CM_ BU_ {} \"{}\";", node.name, node.comment)?;
        }
        for message in &self.messages {
            if !message.comment.is_empty() {
                dbc_output!(code, IDT0, "CM_ BO_ {} \"{}\";", message.id, message.comment)?;
            }
            for signal in message.signals.iter().filter(|sig| !sig.comment.is_empty()) {
                dbc_output!(
                    code,
                    IDT0,
                    "CM_ SG_ {} {} \"{}\";",
                    message.id,
                    signal.name,
                    signal.comment
                )?;
            }
        }
        for env in self.environment_variables.iter().filter(|env| !env.comment.is_empty()) {
            dbc_output!(code, IDT0, "CM_ EV_ {} \"{}\";", env.name, env.comment)?;
        }
        Ok(())
    }

    fn gen_dbc_definitions<W: Write>(&self, code: &mut DbcWriter<W>) -> io::Result<()> {
        for relation in [false, true] {
            let keyword = if relation { "BA_DEF_REL_" } else { "BA_DEF_" };
            for def in self.emitted_definitions(relation) {
                let shape = match def.kind {
                    AttrKind::Integer | AttrKind::Hex | AttrKind::Float => {
                        format!("{} {}", def.kind.keyword(), range_text(def))
                    }
                    AttrKind::String => "STRING ".to_owned(),
                    AttrKind::Enumeration => {
                        let labels: Vec<String> = def.values.iter().map(|label| quoted(label)).collect();
                        format!("ENUM  {}", labels.join(","))
                    }
                };
                let head = match def.object.keyword() {
                    "" => keyword.to_owned(),
                    object => format!("{} {}", keyword, object),
                };
                dbc_output!(code, IDT0, "{}  \"{}\" {};", head, def.name, shape)?;
            }
        }

        for relation in [false, true] {
            let keyword = if relation { "BA_DEF_DEF_REL_" } else { "BA_DEF_DEF_" };
            for def in self.emitted_definitions(relation) {
                if let Some(default) = &def.default {
                    dbc_output!(code, IDT0, "{}  \"{}\" {};", keyword, def.name, default_text(default))?;
                }
            }
        }
        Ok(())
    }

    /// `BA_` lines of one entity, in definition order.
    fn gen_dbc_attributes<W: Write>(
        &self,
        code: &mut DbcWriter<W>,
        target: &str,
        attributes: &AttrMap,
    ) -> io::Result<()> {
        for def in self.emitted_definitions(false) {
            let Some(value) = attributes.get(&def.name) else {
                continue;
            };
            if let Some(text) = attribute_text(def, value) {
                dbc_output!(code, IDT0, "BA_ \"{}\" {} {};", def.name, target, text)?;
            }
        }
        for name in attributes.keys() {
            if self.attribute_def(name).is_none() {
                log::warn!("attribute:{} on {} has no definition, skipped", name, target);
            }
        }
        Ok(())
    }

    fn gen_dbc_values<W: Write>(&self, code: &mut DbcWriter<W>) -> io::Result<()> {
        for (name, raw) in &self.attributes {
            let def = self.attribute_def(name);
            if def.is_some() && self.emitted_definition(name).is_none() {
                continue;
            }
            dbc_output!(code, IDT0, "BA_ \"{}\" {};", name, network_attribute_text(def, raw))?;
        }
        for node in &self.nodes {
            self.gen_dbc_attributes(code, &format!("BU_ {}", node.name), &node.attributes)?;
        }
        for message in &self.messages {
            self.gen_dbc_attributes(code, &format!("BO_ {}", message.id), &message.attributes)?;
        }
        for message in &self.messages {
            for signal in &message.signals {
                let target = format!("SG_ {} {}", message.id, signal.name);
                self.gen_dbc_attributes(code, &target, &signal.attributes)?;
            }
        }
        for env in &self.environment_variables {
            self.gen_dbc_attributes(code, &format!("EV_ {}", env.name), &env.attributes)?;
        }

        for message in &self.messages {
            for signal in message.signals.iter().filter(|sig| !sig.values.is_empty()) {
                dbc_output!(
                    code,
                    IDT0,
                    "VAL_ {} {} {} ;",
                    message.id,
                    signal.name,
                    value_pairs(&signal.values)
                )?;
            }
        }
        for env in self.environment_variables.iter().filter(|env| !env.values.is_empty()) {
            dbc_output!(code, IDT0, "VAL_ {} {} ;", env.name, value_pairs(&env.values))?;
        }
        Ok(())
    }

    fn gen_dbc_trailer<W: Write>(&self, code: &mut DbcWriter<W>) -> io::Result<()> {
        for message in &self.messages {
            for signal in &message.signals {
                if signal.extended_value_type != SignalExtendedValueType::default() {
                    dbc_output!(
                        code,
                        IDT0,
                        "SIG_VALTYPE_ {} {} : {};",
                        message.id,
                        signal.name,
                        signal.extended_value_type.as_code()
                    )?;
                }
            }
        }
        for message in &self.messages {
            for group in &message.signal_groups {
                dbc_output!(
                    code,
                    IDT0,
                    "SIG_GROUP_ {} {} {} : {};",
                    message.id,
                    group.name,
                    group.repetitions,
                    group.signal_names.join(" ")
                )?;
            }
        }
        for record in &self.multiplexed_values {
            dbc_output!(code, IDT0, record)?;
        }
        Ok(())
    }

    /// Serialize the network as DBC text in canonical section order.
    ///
    /// # Errors
    /// Propagates any I/O error from `outfd`.
    pub fn write_dbc<W>(&self, outfd: W) -> io::Result<()>
    where
        W: Write,
    {
        let mut code = DbcWriter { outfd };
        self.gen_dbc_header(&mut code)?;
        self.gen_dbc_frames(&mut code)?;
        self.gen_dbc_comments(&mut code)?;
        self.gen_dbc_definitions(&mut code)?;
        self.gen_dbc_values(&mut code)?;
        self.gen_dbc_trailer(&mut code)?;
        code.outfd.flush()
    }

    /// Output path used by [`Network::save`] when none is given.
    #[must_use]
    pub fn derived_path(&self) -> Option<PathBuf> {
        let source = self.source.as_ref()?;
        let target = source.with_extension("dbc");
        if target != *source {
            return Some(target);
        }
        let stem = source.file_stem()?.to_string_lossy();
        Some(source.with_file_name(format!("{stem}_merged.dbc")))
    }

    /// Write the network to `path`, or next to the last loaded source.
    ///
    /// # Errors
    /// `SourceIO` when the file cannot be written or no path can be derived.
    pub fn save(&self, path: Option<&Path>) -> DbcResult<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => self.derived_path().ok_or_else(|| {
                DbcError::io(
                    PathBuf::new(),
                    io::Error::new(io::ErrorKind::InvalidInput, "no output path and no source to derive it from"),
                )
            })?,
        };

        let outfd = File::create(&path).map_err(|error| DbcError::io(&path, error))?;
        self.write_dbc(BufWriter::new(outfd)).map_err(|error| DbcError::io(&path, error))?;
        log::info!("dbc saved path:{} messages:{}", path.display(), self.messages.len());
        Ok(path)
    }

    /// Pretty JSON dump of the whole model.
    ///
    /// # Errors
    /// Propagates `serde_json` serialization errors.
    #[cfg(all(feature = "serde", feature = "serde_json"))]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, format: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = Vec::new();
        self.write_dbc(&mut buffer).map_err(|_| fmt::Error)?;
        format.write_str(&String::from_utf8_lossy(&buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttrObject;

    fn sample() -> Network {
        let mut network = Network::new();
        network.nodes.push(Node::new("Engine"));
        let mut msg = Message::new(100, "Status", 8, Transmitter::NodeName("Engine".into()));
        let mut sig = Signal::new("Speed");
        sig.multiplexer_indicator = MultiplexIndicator::MultiplexedSignal(1);
        sig.start_bit = 8;
        sig.size = 16;
        sig.byte_order = ByteOrder::LittleEndian;
        sig.factor = 0.5;
        sig.max = 100.0;
        sig.unit = "km/h".into();
        sig.attributes.insert("GenSigSendType".into(), AttrValue::Enum("OnChange".into()));
        sig.attributes.insert("SystemSignalLongSymbol".into(), AttrValue::String("Speed".into()));
        msg.add_signal(sig);
        msg.attributes.insert("GenMsgCycleTime".into(), AttrValue::Integer(10));
        network.append_message(msg);
        network
    }

    #[test]
    fn signal_line_shape() {
        let text = sample().to_string();
        assert!(text.contains("BO_ 100 Status: 8 Engine\n SG_ Speed m1 : 8|16@1+ (0.5,0) [0|100] \"km/h\" Vector__XXX\n"));
        assert!(text.contains("BU_: Engine\n"));
    }

    #[test]
    fn enum_written_as_merged_index() {
        let text = sample().to_string();
        assert!(text.contains("BA_ \"GenSigSendType\" SG_ 100 Speed 1;"));
        assert!(text.contains("BA_ \"GenMsgCycleTime\" BO_ 100 10;"));
        assert!(text.contains("BA_ \"DBName\" \"CAN\";"));
    }

    #[test]
    fn empty_enum_label_is_skipped() {
        let mut network = sample();
        let msg = network.message_mut(MessageId(100)).unwrap();
        msg.attributes.insert("GenMsgSendType".into(), AttrValue::Enum(String::new()));
        let text = network.to_string();
        assert!(!text.contains("BA_ \"GenMsgSendType\" BO_ 100"));
        assert!(text.contains("BA_ \"GenMsgCycleTime\" BO_ 100 10;"));
    }

    #[test]
    fn suppressed_definition_is_never_written() {
        let text = sample().to_string();
        assert!(!text.contains("SystemSignalLongSymbol"));
        assert!(text.contains("BA_DEF_ BO_  \"GenMsgCycleTime\" INT 0 0;"));
        assert!(text.contains("BA_DEF_DEF_  \"GenMsgSendType\" \"noMsgSendType\";"));
    }

    #[test]
    fn relation_definitions_go_last() {
        let mut network = Network::default();
        network.register_or_update("Timeout", AttrObject::NodeMappedRxSignal, AttrKind::Integer, Some(0.0), Some(9.0), None, &[]);
        network.register_or_update("Doc", AttrObject::Network, AttrKind::String, None, None, None, &[]);
        let text = network.to_string();
        let plain = text.find("BA_DEF_  \"Doc\" STRING ;").unwrap();
        let relation = text.find("BA_DEF_REL_ BU_SG_REL_  \"Timeout\" INT 0 9;").unwrap();
        assert!(plain < relation);
    }

    #[test]
    fn derived_path_never_overwrites_source() {
        let mut network = Network::default();
        assert!(network.derived_path().is_none());
        network.source = Some(PathBuf::from("dir/matrix.xls"));
        assert_eq!(network.derived_path(), Some(PathBuf::from("dir/matrix.dbc")));
        network.source = Some(PathBuf::from("dir/bus.dbc"));
        assert_eq!(network.derived_path(), Some(PathBuf::from("dir/bus_merged.dbc")));
    }
}
