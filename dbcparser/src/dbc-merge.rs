/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
 * Reference: http://mcu.so/Microcontroller/Automotive/dbc-file-format-documentation_compress.pdf
 */

//! Merge rules applied while several sources are loaded into one network.
//!
//! Scalars coming from the later source win, collections are unioned, and
//! comments keep the first non-empty text.

use crate::data::*;

/// Append names not already listed, keeping order.
pub(crate) fn union_names(target: &mut Vec<String>, incoming: &[String]) {
    for name in incoming {
        if !target.contains(name) {
            target.push(name.clone());
        }
    }
}

/// Union of two value tables, incoming labels replace existing ones in place.
pub(crate) fn union_descriptions(target: &mut ValueDescriptions, incoming: ValueDescriptions) {
    for (key, label) in incoming {
        target.insert(key, label);
    }
}

fn union_attributes(target: &mut AttrMap, incoming: AttrMap) {
    for (name, value) in incoming {
        target.insert(name, value);
    }
}

fn adopt_comment(target: &mut String, incoming: String) {
    if target.is_empty() {
        *target = incoming;
    }
}

/// Message ordering used by [`Network::sort`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SortKey {
    /// ids compared as decimal text, signals by start bit
    #[default]
    Id,
    Name,
}

impl Signal {
    /// Fold a structurally identical signal into this one.
    pub fn merge(&mut self, incoming: Signal) {
        self.multiplexer_indicator = incoming.multiplexer_indicator;
        self.start_bit = incoming.start_bit;
        self.size = incoming.size;
        self.byte_order = incoming.byte_order;
        self.value_type = incoming.value_type;
        if incoming.extended_value_type != SignalExtendedValueType::default() {
            self.extended_value_type = incoming.extended_value_type;
        }
        self.factor = incoming.factor;
        self.offset = incoming.offset;
        self.min = incoming.min;
        self.max = incoming.max;
        self.unit = incoming.unit;

        if incoming.name != self.name {
            let dropped = if incoming.name.len() >= self.name.len() {
                std::mem::replace(&mut self.name, incoming.name)
            } else {
                incoming.name
            };
            log::debug!("signal:{} absorbs structural twin:{}", self.name, dropped);
            union_names(&mut self.aliases, &[dropped]);
        }
        union_names(&mut self.aliases, &incoming.aliases);
        self.aliases.retain(|alias| *alias != self.name);

        union_descriptions(&mut self.values, incoming.values);
        union_attributes(&mut self.attributes, incoming.attributes);
        union_names(&mut self.receivers, &incoming.receivers);
        adopt_comment(&mut self.comment, incoming.comment);
    }
}

impl Message {
    /// Add a signal, merging it with an existing one of the same identity.
    ///
    /// Returns the index of the signal inside the message.
    pub fn add_signal(&mut self, candidate: Signal) -> usize {
        union_names(&mut self.receivers, &candidate.receivers);
        let strategy = self.signal_match();
        match self.signals.iter().position(|sig| sig.same_as(&candidate, strategy)) {
            Some(idx) => {
                self.signals[idx].merge(candidate);
                idx
            }
            None => {
                self.signals.push(candidate);
                self.signals.len() - 1
            }
        }
    }

    pub fn merge_signal_group(&mut self, incoming: SignalGroup) {
        match self.signal_groups.iter_mut().find(|group| group.name == incoming.name) {
            Some(group) => {
                group.repetitions = incoming.repetitions;
                union_names(&mut group.signal_names, &incoming.signal_names);
            }
            None => self.signal_groups.push(incoming),
        }
    }

    /// Fold a message of the same id into this one.
    pub fn merge(&mut self, incoming: Message) {
        if self.name != incoming.name {
            log::debug!("message:{} renamed {} -> {}", self.id, self.name, incoming.name);
        }
        self.name = incoming.name;
        self.size = incoming.size;
        if !incoming.send_type.is_empty() {
            self.send_type = incoming.send_type;
        }
        if incoming.sender.is_node() {
            self.sender = incoming.sender;
        }
        union_attributes(&mut self.attributes, incoming.attributes);
        union_names(&mut self.receivers, &incoming.receivers);
        union_names(&mut self.transmitters, &incoming.transmitters);
        adopt_comment(&mut self.comment, incoming.comment);
        for sig in incoming.signals {
            self.add_signal(sig);
        }
        for group in incoming.signal_groups {
            self.merge_signal_group(group);
        }
    }
}

impl Network {
    /// Add a message, merging it with an existing one of the same id.
    ///
    /// Returns the index of the message, which receives the `SG_` records that follow.
    pub fn append_message(&mut self, candidate: Message) -> usize {
        match self.messages.iter().position(|msg| msg.id == candidate.id) {
            Some(idx) => {
                self.messages[idx].merge(candidate);
                idx
            }
            None => {
                self.messages.push(candidate);
                self.messages.len() - 1
            }
        }
    }

    /// Add an environment variable, merging by name.
    pub fn append_env_var(&mut self, incoming: EnvironmentVariable) -> usize {
        let Some(idx) = self.environment_variables.iter().position(|env| env.name == incoming.name)
        else {
            self.environment_variables.push(incoming);
            return self.environment_variables.len() - 1;
        };

        let env = &mut self.environment_variables[idx];
        env.env_type = incoming.env_type;
        env.min = incoming.min;
        env.max = incoming.max;
        env.unit = incoming.unit;
        env.initial_value = incoming.initial_value;
        env.ev_id = incoming.ev_id;
        env.access_type = incoming.access_type;
        union_names(&mut env.access_nodes, &incoming.access_nodes);
        union_descriptions(&mut env.values, incoming.values);
        union_attributes(&mut env.attributes, incoming.attributes);
        adopt_comment(&mut env.comment, incoming.comment);
        idx
    }

    /// Add a named value table, merging by name.
    pub fn append_value_table(&mut self, incoming: ValueTable) {
        match self.value_tables.iter_mut().find(|table| table.name == incoming.name) {
            Some(table) => union_descriptions(&mut table.values, incoming.values),
            None => self.value_tables.push(incoming),
        }
    }

    /// Add a node, merging by name.
    pub fn append_node(&mut self, incoming: Node) {
        let node = self.node_or_insert(&incoming.name);
        union_attributes(&mut node.attributes, incoming.attributes);
        adopt_comment(&mut node.comment, incoming.comment);
    }

    /// Stable reordering of messages (and signals when sorting by id).
    pub fn sort(&mut self, key: SortKey) {
        match key {
            SortKey::Id => {
                // ids compare as text, "100" comes before "20"
                self.messages.sort_by_cached_key(|msg| msg.id.to_string());
                for msg in &mut self.messages {
                    msg.signals.sort_by_key(|sig| sig.start_bit);
                }
            }
            SortKey::Name => self.messages.sort_by(|a, b| a.name.cmp(&b.name)),
        }
    }
}
