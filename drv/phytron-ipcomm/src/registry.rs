// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Axis registry: which addresses answered the probe, and under what name.

use std::collections::BTreeMap;

use drv_ipcomm_api::{Addr, ExtendedStatus, SimpleStatus};

/// Axis names supplied to enumeration.
///
/// `ById` binds names to specific bus addresses; `ByPosition` binds the
/// i-th name to the i-th *probed* address, whether or not earlier probes
/// found anything. Names that are not strictly ASCII-alphabetic are
/// ignored, which keeps the name map disjoint from numeric ID strings.
#[derive(Clone, Debug)]
pub enum AxisNames {
    ByPosition(Vec<String>),
    ById(BTreeMap<Addr, String>),
}

impl AxisNames {
    pub(crate) fn name_for(
        &self,
        position: usize,
        addr: Addr,
    ) -> Option<&str> {
        let name = match self {
            AxisNames::ByPosition(names) => names.get(position)?,
            AxisNames::ById(names) => names.get(&addr)?,
        };
        is_axis_name(name).then_some(name.as_str())
    }
}

/// Strictly `[A-Za-z]+`.
pub(crate) fn is_axis_name(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphabetic())
}

pub(crate) struct AxisRecord {
    pub name: Option<String>,
    pub last_status: Option<SimpleStatus>,
    pub last_extended: Option<ExtendedStatus>,
}

#[derive(Default)]
pub(crate) struct Registry {
    by_id: BTreeMap<Addr, AxisRecord>,
    by_name: BTreeMap<String, Addr>,
}

impl Registry {
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_name.clear();
    }

    pub fn insert(
        &mut self,
        addr: Addr,
        name: Option<String>,
        status: SimpleStatus,
        extended: ExtendedStatus,
    ) {
        if let Some(name) = &name {
            self.by_name.insert(name.clone(), addr);
        }
        self.by_id.insert(
            addr,
            AxisRecord {
                name,
                last_status: Some(status),
                last_extended: Some(extended),
            },
        );
    }

    /// Resolves a lookup key: alphabetic keys consult the name map,
    /// anything else must parse as a numeric ID.
    pub fn resolve(&self, key: &str) -> Option<Addr> {
        if is_axis_name(key) {
            self.by_name.get(key).copied()
        } else {
            let id: u8 = key.trim().parse().ok()?;
            let addr = Addr::new(id)?;
            self.by_id.contains_key(&addr).then_some(addr)
        }
    }

    pub fn contains_id(&self, addr: Addr) -> bool {
        self.by_id.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = Addr> + '_ {
        self.by_id.keys().copied()
    }

    pub fn record(&self, addr: Addr) -> Option<&AxisRecord> {
        self.by_id.get(&addr)
    }

    pub fn record_mut(&mut self, addr: Addr) -> Option<&mut AxisRecord> {
        self.by_id.get_mut(&addr)
    }
}
