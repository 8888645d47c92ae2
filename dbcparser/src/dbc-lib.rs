/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
 * Reference: http://mcu.so/Microcontroller/Automotive/dbc-file-format-documentation_compress.pdf
 */

#![doc(
    html_logo_url = "https://iot.bzh/images/defaults/company/512-479-max-transp.png",
    html_favicon_url = "https://iot.bzh/images/defaults/favicon.ico"
)]

//! CAN database (DBC) model with a line parser, a multi-source merge engine,
//! a matrix importer and a serializer writing the canonical section order.

extern crate nom;

#[path = "dbc-error.rs"]
pub mod error;

#[path = "dbc-data.rs"]
pub mod data;

#[path = "dbc-attribute.rs"]
pub mod attribute;

#[path = "dbc-cursor.rs"]
pub mod cursor;

#[path = "dbc-parser.rs"]
pub mod parser;

#[path = "dbc-merge.rs"]
pub mod merge;

#[path = "dbc-writer.rs"]
pub mod writer;

#[path = "dbc-matrix.rs"]
pub mod matrix;

pub use crate::data::*;
pub use crate::error::{DbcError, DbcResult};

pub mod prelude {
    pub use crate::attribute::{AttrKind, AttrObject, AttributeDefinition};
    pub use crate::cursor::LineCursor;
    pub use crate::data::*;
    pub use crate::error::{DbcError, DbcResult};
    pub use crate::matrix::{Cell, ColumnMap, ColumnRole};
    pub use crate::merge::SortKey;
    pub use crate::parser::{LoadReport, UnparsedLine};
}
