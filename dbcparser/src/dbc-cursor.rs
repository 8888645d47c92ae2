/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

use crate::error::{DbcError, DbcResult};
use std::io::{self, BufRead};
use std::path::PathBuf;

type LineSource<'a> = Box<dyn Iterator<Item = io::Result<String>> + 'a>;

/// Pull based line source with one line of lookahead.
///
/// Records that span several physical lines (open comments, value tables)
/// pull their continuation from the same cursor the main loop reads from.
pub struct LineCursor<'a> {
    source: LineSource<'a>,
    pending: Option<String>,
    line_no: usize,
    origin: PathBuf,
}

/// DBC files are often latin-1, keep every byte rather than failing.
fn decode_line(mut bytes: Vec<u8>) -> String {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(error) => error.into_bytes().iter().map(|&byte| char::from(byte)).collect(),
    }
}

impl<'a> LineCursor<'a> {
    /// Stream lines from any buffered reader, without loading the whole source.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: BufRead + 'a,
    {
        let lines = reader.split(b'\n').map(|chunk| chunk.map(decode_line));
        LineCursor::new(Box::new(lines))
    }

    /// Canned lines, mostly for tests.
    pub fn from_lines<I>(lines: I) -> Self
    where
        I: IntoIterator + 'a,
        I::IntoIter: 'a,
        I::Item: Into<String>,
    {
        LineCursor::new(Box::new(lines.into_iter().map(|line| Ok(line.into()))))
    }

    pub fn from_text(text: &'a str) -> Self {
        LineCursor::new(Box::new(text.lines().map(|line| Ok(line.to_owned()))))
    }

    fn new(source: LineSource<'a>) -> Self {
        LineCursor { source, pending: None, line_no: 0, origin: PathBuf::new() }
    }

    /// Name reported in io errors.
    #[must_use]
    pub fn origin<P>(mut self, origin: P) -> Self
    where
        P: Into<PathBuf>,
    {
        self.origin = origin.into();
        self
    }

    fn pull(&mut self) -> DbcResult<Option<String>> {
        match self.source.next() {
            None => Ok(None),
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(error)) => Err(DbcError::io(self.origin.clone(), error)),
        }
    }

    /// Look at the next line without consuming it.
    ///
    /// # Errors
    /// `SourceIO` when the underlying reader fails.
    pub fn peek(&mut self) -> DbcResult<Option<&str>> {
        if self.pending.is_none() {
            self.pending = self.pull()?;
        }
        Ok(self.pending.as_deref())
    }

    /// Consume the next line.
    ///
    /// # Errors
    /// `SourceIO` when the underlying reader fails.
    pub fn advance(&mut self) -> DbcResult<Option<String>> {
        let line = match self.pending.take() {
            Some(line) => Some(line),
            None => self.pull()?,
        };
        if line.is_some() {
            self.line_no += 1;
        }
        Ok(line)
    }

    /// 1-based number of the last consumed line.
    #[must_use]
    pub fn line_number(&self) -> usize {
        self.line_no
    }
}
