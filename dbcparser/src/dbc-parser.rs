/*
 * Copyright (C) 2018 Marcel Buesing (MIT License)
 * Origin: https://github.com/marcelbuesing/can-dbc
 *
 * Adaptation (2022) to Redpesk and LibAfb model
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

//! Single pass DBC line reader.
//!
//! Every physical line is classified by its leading keyword and handed to a
//! record handler. Fixed shape records are matched with nom; comments and
//! value tables may continue on the following physical lines and pull them
//! from the same [`LineCursor`].

use crate::attribute::{parse_int, unquote, AttrKind, AttrObject};
use crate::cursor::LineCursor;
use crate::data::*;
use crate::error::{DbcError, DbcResult};
use crate::merge::{union_descriptions, union_names};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{self, char, hex_digit1},
    combinator::{map, map_opt, opt, success, value},
    error::{ErrorKind, ParseError},
    number::complete::double,
    sequence::{preceded, terminated},
    AsChar, IResult, InputTakeAtPosition,
};

/// Keywords starting a record, used to stop runaway continuations.
const RECORD_KEYWORDS: [&str; 24] = [
    "VERSION",
    "NS_",
    "BS_",
    "BU_",
    "BO_",
    "SG_",
    "CM_",
    "BA_DEF_",
    "BA_DEF_REL_",
    "BA_DEF_DEF_",
    "BA_DEF_DEF_REL_",
    "BA_",
    "BA_REL_",
    "VAL_",
    "VAL_TABLE_",
    "EV_",
    "ENVVAR_DATA_",
    "BO_TX_BU_",
    "SIG_VALTYPE_",
    "SIG_GROUP_",
    "SG_MUL_VAL_",
    "SGTYPE_",
    "SIG_TYPE_REF_",
    "BU_SG_REL_",
];

/// Line consumed without being understood.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnparsedLine {
    pub line: usize,
    pub text: String,
}

/// Outcome of one source load.
#[derive(Clone, Debug, Default)]
pub struct LoadReport {
    pub source: String,
    pub lines: usize,
    pub unparsed: Vec<UnparsedLine>,
}

/// Entity addressed by `CM_` and `BA_` records.
#[derive(Clone, Debug, PartialEq)]
enum Target {
    Network,
    Node(String),
    Message(MessageId),
    Signal(MessageId, String),
    EnvVar(String),
}

fn is_separator(chr: char) -> bool {
    chr.is_whitespace() || "()[]|,:;".contains(chr)
}

fn is_c_string_char(chr: char) -> bool {
    chr.is_ascii_digit() || chr.is_alphabetic() || chr == '_'
}

fn is_c_ident_head(chr: char) -> bool {
    chr.is_alphabetic() || chr == '_'
}

fn is_quote(chr: char) -> bool {
    chr == '"'
}

fn first_token(line: &str) -> &str {
    line.split(is_separator).find(|token| !token.is_empty()).unwrap_or_default()
}

fn is_record_start(line: &str) -> bool {
    RECORD_KEYWORDS.contains(&first_token(line))
}

/// Comment fragment closed by `";`, blanks allowed before the semicolon.
fn closed_comment(fragment: &str) -> Option<&str> {
    fragment.trim_end().strip_suffix(';')?.trim_end().strip_suffix('"')
}

/// Node or signal names separated by blanks or commas, sentinel dropped.
fn name_list(s: &str) -> Vec<String> {
    s.split(|chr: char| chr.is_whitespace() || chr == ',' || chr == ';')
        .filter(|name| !name.is_empty() && *name != VECTOR_XXX)
        .map(str::to_owned)
        .collect()
}

/// Multispace zero or more
fn ms0<T, E: ParseError<T>>(input: T) -> IResult<T, T, E>
where
    T: InputTakeAtPosition,
    <T as InputTakeAtPosition>::Item: AsChar + Clone,
{
    input.split_at_position_complete(|item| {
        let c = item.as_char();
        c != ' ' && c != '\t'
    })
}

/// Multi space one or more
fn ms1<T, E: ParseError<T>>(input: T) -> IResult<T, T, E>
where
    T: InputTakeAtPosition,
    <T as InputTakeAtPosition>::Item: AsChar + Clone,
{
    input.split_at_position1_complete(
        |item| {
            let c = item.as_char();
            c != ' ' && c != '\t'
        },
        ErrorKind::MultiSpace,
    )
}

/// Colon aka `:`
fn colon(s: &str) -> IResult<&str, char> {
    char(':')(s)
}

/// Comma aka ','
fn comma(s: &str) -> IResult<&str, char> {
    char(',')(s)
}

/// Quote aka '"'
fn quote(s: &str) -> IResult<&str, char> {
    char('"')(s)
}

/// Pipe character
fn pipe(s: &str) -> IResult<&str, char> {
    char('|')(s)
}

/// at character
fn at(s: &str) -> IResult<&str, char> {
    char('@')(s)
}

/// brace open aka '('
fn brc_open(s: &str) -> IResult<&str, char> {
    char('(')(s)
}

/// brace close aka ')'
fn brc_close(s: &str) -> IResult<&str, char> {
    char(')')(s)
}

/// bracket open aka '['
fn brk_open(s: &str) -> IResult<&str, char> {
    char('[')(s)
}

/// bracket close aka ']'
fn brk_close(s: &str) -> IResult<&str, char> {
    char(']')(s)
}

/// A valid C_identifier. C_identifiers start with a  alphacharacter or an underscore
/// and may further consist of alpha­numeric, characters and underscore
fn c_ident(s: &str) -> IResult<&str, String> {
    let (s, head) = take_while1(is_c_ident_head)(s)?;
    let (s, remaining) = take_while(is_c_string_char)(s)?;
    Ok((s, [head, remaining].concat()))
}

fn char_string(s: &str) -> IResult<&str, &str> {
    let (s, _) = quote(s)?;
    let (s, char_string_value) = take_till(is_quote)(s)?;
    let (s, _) = quote(s)?;
    Ok((s, char_string_value))
}

fn little_endian(s: &str) -> IResult<&str, ByteOrder> {
    map(char('1'), |_| ByteOrder::LittleEndian)(s)
}

fn big_endian(s: &str) -> IResult<&str, ByteOrder> {
    map(char('0'), |_| ByteOrder::BigEndian)(s)
}

fn byte_order(s: &str) -> IResult<&str, ByteOrder> {
    alt((little_endian, big_endian))(s)
}

fn message_id(s: &str) -> IResult<&str, MessageId> {
    map(complete::u32, MessageId)(s)
}

fn signed(s: &str) -> IResult<&str, ValueType> {
    map(char('-'), |_| ValueType::Signed)(s)
}

fn unsigned(s: &str) -> IResult<&str, ValueType> {
    map(char('+'), |_| ValueType::Unsigned)(s)
}

fn value_type(s: &str) -> IResult<&str, ValueType> {
    alt((signed, unsigned))(s)
}

fn multiplexer(s: &str) -> IResult<&str, MultiplexIndicator> {
    let (s, _) = char('m')(s)?;
    let (s, d) = complete::u64(s)?;
    Ok((s, MultiplexIndicator::MultiplexedSignal(d)))
}

fn multiplexor(s: &str) -> IResult<&str, MultiplexIndicator> {
    let (s, _) = char('M')(s)?;
    Ok((s, MultiplexIndicator::Multiplexor))
}

fn multiplexor_and_multiplexed(s: &str) -> IResult<&str, MultiplexIndicator> {
    let (s, _) = char('m')(s)?;
    let (s, d) = complete::u64(s)?;
    let (s, _) = char('M')(s)?;
    Ok((s, MultiplexIndicator::MultiplexorAndMultiplexedSignal(d)))
}

fn multiplexer_indicator(s: &str) -> IResult<&str, MultiplexIndicator> {
    alt((multiplexor_and_multiplexed, multiplexer, multiplexor))(s)
}

/// Number inside a bracket/brace list, blanks allowed around it
fn spaced_double(s: &str) -> IResult<&str, f64> {
    preceded(ms0, double)(s)
}

fn version(s: &str) -> IResult<&str, &str> {
    let (s, _) = tag("VERSION")(s)?;
    let (s, _) = ms0(s)?;
    char_string(s)
}

fn message(s: &str) -> IResult<&str, Message> {
    let (s, _) = tag("BO_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, message_id) = complete::u32(s)?;
    let (s, _) = ms1(s)?;
    let (s, message_name) = c_ident(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = colon(s)?;
    let (s, _) = ms0(s)?;
    let (s, message_size) = complete::u64(s)?;
    let (s, _) = ms0(s)?;
    let (s, transmitter) = opt(c_ident)(s)?;
    let sender = Transmitter::from_name(transmitter.as_deref().unwrap_or_default());
    Ok((s, Message::new(message_id, &message_name, message_size, sender)))
}

fn signal(s: &str) -> IResult<&str, Signal> {
    let (s, _) = tag("SG_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, name) = c_ident(s)?;
    let (s, _) = ms0(s)?;
    let (s, multiplexer_indicator) = opt(terminated(multiplexer_indicator, ms0))(s)?;
    let (s, _) = colon(s)?;
    let (s, _) = ms0(s)?;
    let (s, start_bit) = complete::u64(s)?;
    let (s, _) = pipe(s)?;
    let (s, size) = complete::u64(s)?;
    let (s, _) = at(s)?;
    let (s, byte_order) = byte_order(s)?;
    let (s, value_type) = value_type(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = brc_open(s)?;
    let (s, factor) = spaced_double(s)?;
    let (s, _) = preceded(ms0, comma)(s)?;
    let (s, offset) = spaced_double(s)?;
    let (s, _) = preceded(ms0, brc_close)(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = brk_open(s)?;
    let (s, min) = spaced_double(s)?;
    let (s, _) = preceded(ms0, pipe)(s)?;
    let (s, max) = spaced_double(s)?;
    let (s, _) = preceded(ms0, brk_close)(s)?;
    let (s, _) = ms0(s)?;
    let (s, unit) = char_string(s)?;

    let mut signal = Signal::new(&name);
    signal.multiplexer_indicator = multiplexer_indicator.unwrap_or(MultiplexIndicator::Plain);
    signal.start_bit = start_bit;
    signal.size = size;
    signal.byte_order = byte_order;
    signal.value_type = value_type;
    signal.factor = factor;
    signal.offset = offset;
    signal.min = min;
    signal.max = max;
    signal.unit = unit.to_owned();
    signal.receivers = name_list(s);
    Ok(("", signal))
}

fn node_target(s: &str) -> IResult<&str, Target> {
    let (s, _) = tag("BU_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, node_name) = c_ident(s)?;
    Ok((s, Target::Node(node_name)))
}

fn message_target(s: &str) -> IResult<&str, Target> {
    let (s, _) = tag("BO_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, message_id) = message_id(s)?;
    Ok((s, Target::Message(message_id)))
}

fn signal_target(s: &str) -> IResult<&str, Target> {
    let (s, _) = tag("SG_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, message_id) = message_id(s)?;
    let (s, _) = ms1(s)?;
    let (s, signal_name) = c_ident(s)?;
    Ok((s, Target::Signal(message_id, signal_name)))
}

fn env_var_target(s: &str) -> IResult<&str, Target> {
    let (s, _) = tag("EV_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, env_var_name) = c_ident(s)?;
    Ok((s, Target::EnvVar(env_var_name)))
}

fn object_target(s: &str) -> IResult<&str, Target> {
    alt((node_target, message_target, signal_target, env_var_target, success(Target::Network)))(s)
}

/// `CM_ <target> "` the comment text follows the opening quote
fn comment_head(s: &str) -> IResult<&str, Target> {
    let (s, _) = tag("CM_")(s)?;
    let (s, _) = ms0(s)?;
    let (s, target) = object_target(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = quote(s)?;
    Ok((s, target))
}

/// `BA_DEF_ [object] "name" KIND`
fn attribute_definition(s: &str) -> IResult<&str, (Option<&str>, &str, &str)> {
    let (s, _) = alt((tag("BA_DEF_REL_"), tag("BA_DEF_")))(s)?;
    let (s, _) = ms1(s)?;
    let (s, object) = opt(terminated(
        alt((
            tag("BU_SG_REL_"),
            tag("BU_EV_REL_"),
            tag("BU_BO_REL_"),
            tag("BU_"),
            tag("BO_"),
            tag("SG_"),
            tag("EV_"),
        )),
        ms1,
    ))(s)?;
    let (s, _) = ms0(s)?;
    let (s, name) = char_string(s)?;
    let (s, _) = ms0(s)?;
    let (s, kind) = take_while1(|chr: char| chr.is_ascii_alphabetic())(s)?;
    Ok((s, (object, name, kind)))
}

fn attribute_range(s: &str) -> IResult<&str, (f64, f64)> {
    let (s, min) = spaced_double(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = opt(comma)(s)?;
    let (s, max) = spaced_double(s)?;
    Ok((s, (min, max)))
}

fn attribute_default(s: &str) -> IResult<&str, &str> {
    let (s, _) = alt((tag("BA_DEF_DEF_REL_"), tag("BA_DEF_DEF_")))(s)?;
    let (s, _) = ms1(s)?;
    char_string(s)
}

fn attribute_value(s: &str) -> IResult<&str, (&str, Target)> {
    let (s, _) = tag("BA_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, attribute_name) = char_string(s)?;
    let (s, _) = ms0(s)?;
    let (s, target) = object_target(s)?;
    Ok((s, (attribute_name, target)))
}

fn env_var_type(s: &str) -> IResult<&str, EnvType> {
    map_opt(complete::u64, EnvType::from_code)(s)
}

fn access_type(s: &str) -> IResult<&str, u32> {
    let (s, _) = tag("DUMMY_NODE_VECTOR")(s)?;
    map_opt(hex_digit1, |code| u32::from_str_radix(code, 16).ok())(s)
}

/// Environment Variable Definitions
fn environment_variable(s: &str) -> IResult<&str, EnvironmentVariable> {
    let (s, _) = tag("EV_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, env_var_name) = c_ident(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = colon(s)?;
    let (s, _) = ms0(s)?;
    let (s, env_var_type) = env_var_type(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = brk_open(s)?;
    let (s, min) = spaced_double(s)?;
    let (s, _) = preceded(ms0, pipe)(s)?;
    let (s, max) = spaced_double(s)?;
    let (s, _) = preceded(ms0, brk_close)(s)?;
    let (s, _) = ms0(s)?;
    let (s, unit) = char_string(s)?;
    let (s, initial_value) = spaced_double(s)?;
    let (s, _) = ms1(s)?;
    let (s, ev_id) = complete::u64(s)?;
    let (s, _) = ms1(s)?;
    let (s, access_code) = access_type(s)?;

    let env_type = if access_code & 0x8000 != 0 { EnvType::String } else { env_var_type };
    Ok((
        "",
        EnvironmentVariable {
            name: env_var_name,
            env_type,
            min,
            max,
            unit: unit.to_owned(),
            initial_value,
            ev_id,
            access_type: AccessType::from_vector(access_code),
            access_nodes: name_list(s),
            ..EnvironmentVariable::default()
        },
    ))
}

fn message_transmitter(s: &str) -> IResult<&str, (MessageId, Vec<String>)> {
    let (s, _) = tag("BO_TX_BU_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, message_id) = message_id(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = colon(s)?;
    Ok(("", (message_id, name_list(s))))
}

fn signed_or_unsigned_integer(s: &str) -> IResult<&str, SignalExtendedValueType> {
    value(SignalExtendedValueType::SignedOrUnsignedInteger, tag("0"))(s)
}
fn ieee_float_32bit(s: &str) -> IResult<&str, SignalExtendedValueType> {
    value(SignalExtendedValueType::IEEEfloat32Bit, tag("1"))(s)
}
fn ieee_double_64bit(s: &str) -> IResult<&str, SignalExtendedValueType> {
    value(SignalExtendedValueType::IEEEdouble64bit, tag("2"))(s)
}

fn signal_extended_value_type(s: &str) -> IResult<&str, SignalExtendedValueType> {
    alt((signed_or_unsigned_integer, ieee_float_32bit, ieee_double_64bit))(s)
}

fn signal_extended_value_type_list(
    s: &str,
) -> IResult<&str, (MessageId, String, SignalExtendedValueType)> {
    let (s, _) = tag("SIG_VALTYPE_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, message_id) = message_id(s)?;
    let (s, _) = ms1(s)?;
    let (s, signal_name) = c_ident(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = opt(colon)(s)?;
    let (s, _) = ms0(s)?;
    let (s, signal_extended_value_type) = signal_extended_value_type(s)?;
    Ok((s, (message_id, signal_name, signal_extended_value_type)))
}

fn signal_groups(s: &str) -> IResult<&str, (MessageId, SignalGroup)> {
    let (s, _) = tag("SIG_GROUP_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, message_id) = message_id(s)?;
    let (s, _) = ms1(s)?;
    let (s, signal_group_name) = c_ident(s)?;
    let (s, _) = ms1(s)?;
    let (s, repetitions) = complete::u64(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = colon(s)?;
    Ok((
        "",
        (
            message_id,
            SignalGroup { name: signal_group_name, repetitions, signal_names: name_list(s) },
        ),
    ))
}

/// Interleaved `<int> "label"` pairs of a complete `VAL_`/`VAL_TABLE_` record.
///
/// Returns the tokens before the first pair (keyword and target) and the table.
fn split_value_pairs(record: &str) -> Option<(Vec<&str>, ValueDescriptions)> {
    let body = record.trim_end();
    let body = body.strip_suffix(';').unwrap_or(body);
    let pieces: Vec<&str> = body.split('"').collect();
    // head, then label/number pairs, then the tail after the last label
    if pieces.len() % 2 == 0 {
        return None;
    }

    let mut head: Vec<&str> = pieces[0].split_whitespace().collect();
    let mut values = ValueDescriptions::new();
    if pieces.len() == 1 {
        return Some((head, values));
    }

    let mut key = head.pop();
    for idx in (1..pieces.len()).step_by(2) {
        let number = parse_int(key?)?;
        values.insert(number, pieces[idx].to_owned());
        key = pieces.get(idx + 1).map(|tail| tail.trim()).filter(|tail| !tail.is_empty());
    }
    // anything left behind the last label is garbage
    if key.is_some() {
        return None;
    }
    Some((head, values))
}

pub(crate) struct DbcLoader<'n, 'c> {
    network: &'n mut Network,
    cursor: LineCursor<'c>,
    current: Option<usize>,
    report: LoadReport,
}

impl<'n, 'c> DbcLoader<'n, 'c> {
    pub(crate) fn new(network: &'n mut Network, name: &str, cursor: LineCursor<'c>) -> Self {
        DbcLoader {
            network,
            cursor,
            current: None,
            report: LoadReport { source: name.to_owned(), ..LoadReport::default() },
        }
    }

    pub(crate) fn run(mut self) -> DbcResult<LoadReport> {
        self.network.begin_source();
        while let Some(raw) = self.cursor.advance()? {
            let lineno = self.cursor.line_number();
            if let Err(error) = self.dispatch(raw.trim(), lineno) {
                let error = error.at_line(lineno);
                log::error!("source:{} {}", self.report.source, error);
                return Err(error);
            }
        }
        self.report.lines = self.cursor.line_number();
        Ok(self.report)
    }

    fn unparsed(&mut self, lineno: usize, line: &str, reason: &str) {
        log::warn!("source:{} line:{} {}: {}", self.report.source, lineno, reason, line);
        self.report.unparsed.push(UnparsedLine { line: lineno, text: line.to_owned() });
    }

    fn dispatch(&mut self, line: &str, lineno: usize) -> DbcResult<()> {
        let tokens: Vec<&str> = line.split(is_separator).filter(|token| !token.is_empty()).collect();
        let Some(keyword) = tokens.first().copied() else {
            return Ok(());
        };
        if tokens.len() < 2 {
            return Ok(());
        }

        match keyword {
            "VERSION" => {
                if let Ok((_, text)) = version(line) {
                    self.network.version = text.to_owned();
                }
            }
            "NS_" | "BS_" => {}
            "BU_" => {
                for name in &tokens[1..] {
                    self.network.node_or_insert(name);
                }
            }
            "BO_" => self.message_record(line, lineno)?,
            "SG_" => self.signal_record(line, lineno)?,
            "CM_" => self.comment_record(line, lineno)?,
            "BA_DEF_" | "BA_DEF_REL_" => self.definition_record(line, lineno)?,
            "BA_DEF_DEF_" | "BA_DEF_DEF_REL_" => self.default_record(line, lineno)?,
            "BA_" => self.attribute_record(line, lineno)?,
            "VAL_" | "VAL_TABLE_" => self.value_record(line, lineno)?,
            "EV_" => self.env_var_record(line, lineno),
            "BO_TX_BU_" => self.transmitter_record(line, lineno),
            "SIG_VALTYPE_" => self.valtype_record(line, lineno),
            "SIG_GROUP_" => self.group_record(line, lineno),
            "SG_MUL_VAL_" => union_names(&mut self.network.multiplexed_values, &[line.to_owned()]),
            _ => self.unparsed(lineno, line, "unsupported record"),
        }
        Ok(())
    }

    fn message_record(&mut self, line: &str, lineno: usize) -> DbcResult<()> {
        let (_, candidate) = message(line)
            .map_err(|_| DbcError::malformed(lineno, format!("invalid BO_ record '{line}'")))?;
        self.current = Some(self.network.append_message(candidate));
        Ok(())
    }

    fn signal_record(&mut self, line: &str, lineno: usize) -> DbcResult<()> {
        let Some(idx) = self.current else {
            return Err(DbcError::malformed(lineno, "SG_ record outside of any BO_ message"));
        };
        let (_, candidate) = signal(line)
            .map_err(|_| DbcError::malformed(lineno, format!("invalid SG_ record '{line}'")))?;

        let msg = &mut self.network.messages[idx];
        let sig_idx = msg.add_signal(candidate);
        let sig = &msg.signals[sig_idx];
        if msg.name != INDEPENDENT_SIG_MSG && !sig.fits_in(msg.size) {
            log::warn!(
                "line:{} signal:{} {}|{} does not fit in message:{} of {} bytes",
                lineno,
                sig.name,
                sig.start_bit,
                sig.size,
                msg.name,
                msg.size
            );
        }
        Ok(())
    }

    /// Comment text, pulling continuation lines while the record is open.
    fn comment_text(&mut self, first: &str, lineno: usize) -> DbcResult<String> {
        if let Some(text) = closed_comment(first) {
            return Ok(text.replace('\r', "\n"));
        }

        let mut text = format!("{first}\n");
        loop {
            match self.cursor.peek()? {
                None => {
                    log::warn!("line:{} comment not closed before end of source", lineno);
                    break;
                }
                Some(next) if next.trim_start().starts_with("CM_") => {
                    log::warn!("line:{} comment not closed before next CM_ record", lineno);
                    break;
                }
                Some(_) => {}
            }
            let Some(next) = self.cursor.advance()? else {
                break;
            };
            let next = next.trim_end();
            if next.is_empty() {
                text.push('\n');
            } else if let Some(last) = closed_comment(next) {
                text.push_str(last);
                return Ok(text.replace('\r', "\n"));
            } else {
                text.push_str(next);
                text.push('\n');
            }
        }
        // unterminated, drop the line break added after the last fragment
        if text.ends_with('\n') {
            text.pop();
        }
        Ok(text.replace('\r', "\n"))
    }

    fn comment_record(&mut self, line: &str, lineno: usize) -> DbcResult<()> {
        let Ok((rest, target)) = comment_head(line) else {
            self.unparsed(lineno, line, "invalid CM_ record");
            return Ok(());
        };
        let comment = self.comment_text(rest, lineno)?;

        match target {
            Target::Network => self.network.comment = comment,
            Target::Node(name) => self.network.node_or_insert(&name).comment = comment,
            Target::Message(id) => match self.network.message_mut(id) {
                Some(msg) => msg.comment = comment,
                None => log::warn!("line:{} comment for unknown message:{}", lineno, id),
            },
            Target::Signal(id, name) => {
                match self.network.message_mut(id).and_then(|msg| msg.signal_mut(&name)) {
                    Some(sig) => sig.comment = comment,
                    None => log::warn!("line:{} comment for unknown signal:{}/{}", lineno, id, name),
                }
            }
            Target::EnvVar(name) => match self.network.env_var_mut(&name) {
                Some(env) => env.comment = comment,
                None => log::warn!("line:{} comment for unknown env var:{}", lineno, name),
            },
        }
        Ok(())
    }

    fn definition_record(&mut self, line: &str, lineno: usize) -> DbcResult<()> {
        let Ok((rest, (object, name, kind))) = attribute_definition(line) else {
            self.unparsed(lineno, line, "invalid attribute definition");
            return Ok(());
        };
        let object = match object {
            None => AttrObject::Network,
            Some(keyword) => match AttrObject::from_keyword(keyword) {
                Some(object) => object,
                None => {
                    self.unparsed(lineno, line, "unsupported relation attribute");
                    return Ok(());
                }
            },
        };
        let kind = AttrKind::from_keyword(kind)?;

        let (range, values) = match kind {
            AttrKind::Enumeration => {
                let labels = rest.split('"').skip(1).step_by(2).map(str::to_owned).collect();
                (None, labels)
            }
            AttrKind::String => (None, Vec::new()),
            AttrKind::Integer | AttrKind::Hex | AttrKind::Float => {
                (attribute_range(rest).ok().map(|(_, range)| range), Vec::new())
            }
        };
        self.network.register_or_update(
            name,
            object,
            kind,
            range.map(|(min, _)| min),
            range.map(|(_, max)| max),
            None,
            &values,
        );
        Ok(())
    }

    fn default_record(&mut self, line: &str, lineno: usize) -> DbcResult<()> {
        let Ok((rest, name)) = attribute_default(line) else {
            self.unparsed(lineno, line, "invalid attribute default");
            return Ok(());
        };
        let raw = rest.trim().trim_end_matches(';').trim();
        if line.starts_with("BA_DEF_DEF_REL_") && self.network.attribute_def(name).is_none() {
            self.unparsed(lineno, line, "default of an unsupported relation attribute");
            return Ok(());
        }
        self.network.set_attribute_default(name, raw)
    }

    fn attribute_record(&mut self, line: &str, lineno: usize) -> DbcResult<()> {
        let Ok((rest, (name, target))) = attribute_value(line) else {
            self.unparsed(lineno, line, "invalid attribute value");
            return Ok(());
        };
        let raw = rest.trim().trim_end_matches(';').trim();

        if target == Target::Network {
            self.network.attributes.insert(name.to_owned(), unquote(raw).to_owned());
            return Ok(());
        }

        let value = self.network.convert(name, raw)?;
        // store under the definition spelling, lookups compare case-insensitively
        let name = self.network.attribute_def(name).map_or_else(|| name.to_owned(), |def| def.name.clone());
        let attributes = match &target {
            Target::Network => None,
            Target::Node(node) => Some(&mut self.network.node_or_insert(node).attributes),
            Target::Message(id) => self.network.message_mut(*id).map(|msg| &mut msg.attributes),
            Target::Signal(id, sig) => self
                .network
                .message_mut(*id)
                .and_then(|msg| msg.signal_mut(sig))
                .map(|sig| &mut sig.attributes),
            Target::EnvVar(env) => self.network.env_var_mut(env).map(|env| &mut env.attributes),
        };
        match attributes {
            Some(attributes) => {
                attributes.insert(name, value);
            }
            None => log::warn!("line:{} attribute:{} for unknown {:?}", lineno, name, target),
        }
        Ok(())
    }

    /// `VAL_`/`VAL_TABLE_` stay open until a terminating `;`.
    fn value_record(&mut self, line: &str, lineno: usize) -> DbcResult<()> {
        let mut record = line.to_owned();
        while !record.ends_with(';') {
            match self.cursor.peek()? {
                Some(next) if !is_record_start(next) => {}
                _ => {
                    log::warn!("line:{} value table not terminated by ';'", lineno);
                    break;
                }
            }
            let Some(next) = self.cursor.advance()? else {
                break;
            };
            let next = next.trim();
            if !next.is_empty() {
                record.push(' ');
                record.push_str(next);
            }
        }

        let Some((head, values)) = split_value_pairs(&record) else {
            self.unparsed(lineno, &record, "invalid value table");
            return Ok(());
        };

        match head.as_slice() {
            ["VAL_TABLE_", name] => {
                self.network.append_value_table(ValueTable { name: (*name).to_owned(), values });
            }
            ["VAL_", id, name] => {
                let Ok(id) = id.parse::<u32>() else {
                    self.unparsed(lineno, &record, "invalid VAL_ message id");
                    return Ok(());
                };
                match self.network.message_mut(MessageId(id)).and_then(|msg| msg.signal_mut(name)) {
                    Some(sig) => union_descriptions(&mut sig.values, values),
                    None => log::warn!("line:{} values for unknown signal:{}/{}", lineno, id, name),
                }
            }
            ["VAL_", name] => match self.network.env_var_mut(name) {
                Some(env) => union_descriptions(&mut env.values, values),
                None => log::warn!("line:{} values for unknown env var:{}", lineno, name),
            },
            _ => self.unparsed(lineno, &record, "invalid value table target"),
        }
        Ok(())
    }

    fn env_var_record(&mut self, line: &str, lineno: usize) {
        let Ok((_, incoming)) = environment_variable(line) else {
            self.unparsed(lineno, line, "invalid EV_ record");
            return;
        };
        self.network.append_env_var(incoming);
    }

    fn transmitter_record(&mut self, line: &str, lineno: usize) {
        let Ok((_, (id, transmitters))) = message_transmitter(line) else {
            self.unparsed(lineno, line, "invalid BO_TX_BU_ record");
            return;
        };
        match self.network.message_mut(id) {
            Some(msg) => union_names(&mut msg.transmitters, &transmitters),
            None => log::warn!("line:{} transmitters for unknown message:{}", lineno, id),
        }
    }

    fn valtype_record(&mut self, line: &str, lineno: usize) {
        let Ok((_, (id, name, value_type))) = signal_extended_value_type_list(line) else {
            self.unparsed(lineno, line, "invalid SIG_VALTYPE_ record");
            return;
        };
        match self.network.message_mut(id).and_then(|msg| msg.signal_mut(&name)) {
            Some(sig) => sig.extended_value_type = value_type,
            None => log::warn!("line:{} value type for unknown signal:{}/{}", lineno, id, name),
        }
    }

    fn group_record(&mut self, line: &str, lineno: usize) {
        let Ok((_, (id, group))) = signal_groups(line) else {
            self.unparsed(lineno, line, "invalid SIG_GROUP_ record");
            return;
        };
        match self.network.message_mut(id) {
            Some(msg) => msg.merge_signal_group(group),
            None => log::warn!("line:{} signal group for unknown message:{}", lineno, id),
        }
    }
}

impl Network {
    /// Parse and merge one DBC file into the network.
    ///
    /// # Errors
    /// `SourceIO` when the file cannot be read, any fatal record error. The
    /// network must be discarded after an error.
    pub fn load<P>(&mut self, path: P) -> DbcResult<LoadReport>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|error| DbcError::io(path, error))?;
        let cursor = LineCursor::from_reader(BufReader::new(file)).origin(path);
        self.load_cursor(&path.display().to_string(), cursor)
    }

    /// Parse and merge DBC text held in memory, `name` identifies the source.
    ///
    /// # Errors
    /// Same as [`Network::load`].
    pub fn load_str(&mut self, name: &str, text: &str) -> DbcResult<LoadReport> {
        self.load_cursor(name, LineCursor::from_text(text))
    }

    /// Parse and merge any line source.
    ///
    /// # Errors
    /// Same as [`Network::load`].
    pub fn load_cursor(&mut self, name: &str, cursor: LineCursor<'_>) -> DbcResult<LoadReport> {
        let report = DbcLoader::new(self, name, cursor).run()?;
        self.source = Some(PathBuf::from(name));
        log::info!(
            "dbc source:{} lines:{} messages:{} unparsed:{}",
            report.source,
            report.lines,
            self.messages.len(),
            report.unparsed.len()
        );
        Ok(report)
    }
}
