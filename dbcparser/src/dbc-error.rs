/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, importing or saving a CAN database.
///
/// Anything returned from a load/import leaves the target network possibly
/// half merged: callers must drop it.
#[derive(Debug, Error)]
pub enum DbcError {
    /// A record did not match its fixed shape.
    #[error("malformed record line:{line} {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// A value was requested for an attribute that has no definition.
    #[error("unknown attribute definition '{0}'")]
    UnknownAttribute(String),

    /// An attribute definition declares an unsupported value kind.
    #[error("unsupported attribute value kind '{0}'")]
    UnsupportedValueKind(String),

    /// Two entities share an identity that must be unique.
    #[error("duplicate identity '{0}'")]
    DuplicateIdentity(String),

    /// A source or destination could not be read/written.
    #[error("source io error on {path:?}: {source}")]
    SourceIO {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DbcError {
    pub fn malformed<T>(line: usize, reason: T) -> DbcError
    where
        T: Into<String>,
    {
        DbcError::MalformedRecord { line, reason: reason.into() }
    }

    pub(crate) fn io<P>(path: P, source: io::Error) -> DbcError
    where
        P: Into<PathBuf>,
    {
        DbcError::SourceIO { path: path.into(), source }
    }

    /// Attach a line number to errors raised away from the parser.
    #[must_use]
    pub fn at_line(self, line: usize) -> DbcError {
        match self {
            DbcError::MalformedRecord { line: 0, reason } => DbcError::MalformedRecord { line, reason },
            other => other,
        }
    }

    /// Short stable identifier, handy for log filtering.
    #[must_use]
    pub fn get_uid(&self) -> &'static str {
        match self {
            DbcError::MalformedRecord { .. } => "malformed-record",
            DbcError::UnknownAttribute(_) => "unknown-attribute",
            DbcError::UnsupportedValueKind(_) => "unsupported-value-kind",
            DbcError::DuplicateIdentity(_) => "duplicate-identity",
            DbcError::SourceIO { .. } => "source-io",
        }
    }
}

pub type DbcResult<T> = Result<T, DbcError>;
