use crate::debugger::address::Address;
use crate::debugger::engine::Engine;
use crate::debugger::error::Error;
use crate::weak_error;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Breakpoint identity, unique within a session, never reused.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BreakpointId(u32);

impl BreakpointId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl Display for BreakpointId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, strum_macros::Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BreakpointKind {
    /// Fires once, then removes itself.
    Temporary,
    /// Stays until removed explicitly.
    Code,
}

/// Breakpoint representation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    id: BreakpointId,
    kind: BreakpointKind,
    address: Address,
    hit_count: u32,
}

impl Breakpoint {
    pub fn id(&self) -> BreakpointId {
        self.id
    }

    pub fn kind(&self) -> BreakpointKind {
        self.kind
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn hit_count(&self) -> u32 {
        self.hit_count
    }

    pub fn is_temporary(&self) -> bool {
        self.kind == BreakpointKind::Temporary
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Breakpoint {} ({}) at {}", self.id, self.kind, self.address)
    }
}

/// What a breakpoint hit did to the breakpoint set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HitReport {
    /// Breakpoints registered at the hit address.
    pub hit: Vec<BreakpointId>,
    /// Temporary breakpoints removed by this hit.
    pub removed: Vec<Breakpoint>,
}

impl HitReport {
    pub fn is_unknown(&self) -> bool {
        self.hit.is_empty()
    }
}

/// Owns session breakpoints and keeps engine arming in sync with them.
///
/// Addresses are armed reference counted: the first breakpoint at an address arms it,
/// the last one removed disarms it. Engine calls are made before bookkeeping changes,
/// so a refused call leaves the manager untouched.
pub struct BreakpointManager {
    engine: Arc<dyn Engine>,
    breakpoints: IndexMap<BreakpointId, Breakpoint>,
    armed: HashMap<Address, usize>,
    last_id: u32,
}

impl BreakpointManager {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            breakpoints: IndexMap::new(),
            armed: HashMap::new(),
            last_id: 0,
        }
    }

    /// Add a breakpoint and arm its address before returning.
    ///
    /// # Arguments
    ///
    /// * `kind`: breakpoint kind, only one `Code` breakpoint allowed per address
    /// * `address`: breakpoint address
    pub fn add(&mut self, kind: BreakpointKind, address: Address) -> Result<BreakpointId, Error> {
        if kind == BreakpointKind::Code
            && self
                .breakpoints
                .values()
                .any(|bp| bp.kind == BreakpointKind::Code && bp.address == address)
        {
            return Err(Error::DuplicateAddress(address));
        }

        if self.arm_count(address) == 0 {
            self.engine.arm_breakpoint(address)?;
        }

        self.last_id += 1;
        let id = BreakpointId(self.last_id);
        self.breakpoints.insert(
            id,
            Breakpoint {
                id,
                kind,
                address,
                hit_count: 0,
            },
        );
        *self.armed.entry(address).or_default() += 1;
        debug!(target: "debugger", "breakpoint {id} ({kind}) added at {address}");

        Ok(id)
    }

    /// Remove a breakpoint, disarm its address if no other breakpoint remains there.
    pub fn remove(&mut self, id: BreakpointId) -> Result<Breakpoint, Error> {
        let address = self
            .breakpoints
            .get(&id)
            .map(|bp| bp.address)
            .ok_or(Error::BreakpointNotFound(id))?;

        if self.arm_count(address) == 1 {
            self.engine.disarm_breakpoint(address)?;
        }

        self.forget(id).ok_or(Error::BreakpointNotFound(id))
    }

    /// Register a hit at address: count it for every breakpoint there and remove
    /// temporary ones. Temporary breakpoints are forgotten even if the engine refuses
    /// to disarm, they never fire twice.
    pub fn hit(&mut self, address: Address) -> HitReport {
        let mut report = HitReport::default();
        let mut fired_temporary = vec![];
        for bp in self.breakpoints.values_mut() {
            if bp.address == address {
                bp.hit_count = bp.hit_count.saturating_add(1);
                report.hit.push(bp.id);
                if bp.is_temporary() {
                    fired_temporary.push(bp.id);
                }
            }
        }

        for id in fired_temporary {
            if self.arm_count(address) == 1 {
                weak_error!(
                    self.engine.disarm_breakpoint(address),
                    "disarm fired temporary breakpoint:"
                );
            }
            report.removed.extend(self.forget(id));
        }

        report
    }

    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    /// All breakpoints ordered by id.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.values().cloned().collect()
    }

    pub fn breakpoints_at(&self, address: Address) -> Vec<Breakpoint> {
        self.breakpoints
            .values()
            .filter(|bp| bp.address == address)
            .cloned()
            .collect()
    }

    pub fn is_armed(&self, address: Address) -> bool {
        self.arm_count(address) > 0
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    fn arm_count(&self, address: Address) -> usize {
        self.armed.get(&address).copied().unwrap_or_default()
    }

    fn forget(&mut self, id: BreakpointId) -> Option<Breakpoint> {
        let bp = self.breakpoints.shift_remove(&id)?;
        if let Some(count) = self.armed.get_mut(&bp.address) {
            *count -= 1;
            if *count == 0 {
                self.armed.remove(&bp.address);
            }
        }
        debug!(target: "debugger", "breakpoint {} removed from {}", bp.id, bp.address);
        Some(bp)
    }
}
