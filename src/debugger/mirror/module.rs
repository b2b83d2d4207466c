use crate::debugger::address::Address;
use crate::debugger::mirror::Mirror;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Module identity assigned by the runtime, stable for the module lifetime.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleHandle(u32);

impl ModuleHandle {
    pub const fn new(raw: u32) -> Self {
        ModuleHandle(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for ModuleHandle {
    fn from(raw: u32) -> Self {
        ModuleHandle(raw)
    }
}

impl Display for ModuleHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

/// Module list entry as reported by the engine.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ModuleDescriptor {
    pub handle: ModuleHandle,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub base: Address,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub is_kernel_module: bool,
    /// Module was unloaded by the runtime.
    #[serde(default)]
    pub unloaded: bool,
}

impl ModuleDescriptor {
    pub fn new(handle: u32, name: impl Into<String>) -> Self {
        Self {
            handle: ModuleHandle::new(handle),
            name: name.into(),
            path: None,
            base: Address::default(),
            size: 0,
            is_kernel_module: false,
            unloaded: false,
        }
    }

    pub fn with_range(mut self, base: impl Into<Address>, size: u64) -> Self {
        self.base = base.into();
        self.size = size;
        self
    }

    pub fn unloaded(mut self) -> Self {
        self.unloaded = true;
        self
    }
}

/// Client side mirror of a runtime module.
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    handle: ModuleHandle,
    name: String,
    path: Option<String>,
    base: Address,
    size: u64,
    is_kernel_module: bool,
    unloaded: bool,
}

impl Module {
    pub fn handle(&self) -> ModuleHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn base(&self) -> Address {
        self.base
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_kernel_module(&self) -> bool {
        self.is_kernel_module
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }

    /// Check that address belongs to module image.
    pub fn contains(&self, addr: Address) -> bool {
        let base = self.base.as_u64();
        addr.as_u64() >= base && addr.as_u64() - base < self.size
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.name, self.handle)?;
        if self.unloaded {
            f.write_str(" (unloaded)")?;
        }
        Ok(())
    }
}

impl Mirror for Module {
    type Handle = ModuleHandle;
    type Descriptor = ModuleDescriptor;

    fn descriptor_handle(desc: &ModuleDescriptor) -> ModuleHandle {
        desc.handle
    }

    fn from_descriptor(desc: ModuleDescriptor) -> Self {
        Self {
            handle: desc.handle,
            name: desc.name,
            path: desc.path,
            base: desc.base,
            size: desc.size,
            is_kernel_module: desc.is_kernel_module,
            unloaded: desc.unloaded,
        }
    }

    fn refresh(&mut self, desc: ModuleDescriptor) {
        debug_assert_eq!(self.handle, desc.handle);
        self.name = desc.name;
        self.path = desc.path;
        self.base = desc.base;
        self.size = desc.size;
        self.is_kernel_module = desc.is_kernel_module;
        // unload is final
        self.unloaded |= desc.unloaded;
    }

    fn is_retired(&self) -> bool {
        self.unloaded
    }
}
