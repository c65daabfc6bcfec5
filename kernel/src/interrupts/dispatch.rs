//! Fixed-size handler tables, filled once at boot.

use alloc::{boxed::Box, vec};

/// Maps small integers (vectors, syscall numbers) to handlers.
pub struct HandlerTable<F: Copy> {
    name: &'static str,
    handlers: Box<[Option<F>]>,
}

impl<F: Copy> HandlerTable<F> {
    pub fn new(name: &'static str, len: usize) -> Self {
        Self {
            name,
            handlers: vec![None; len].into_boxed_slice(),
        }
    }

    /// Installs `handler` at `index`.
    ///
    /// # Panics
    /// If `index` is out of range or already has a handler. Both are
    /// programming errors in boot code.
    pub fn register(&mut self, index: usize, handler: F) {
        let Some(slot) = self.handlers.get_mut(index) else {
            panic!("{} {} is out of bounds", self.name, index);
        };
        if slot.is_some() {
            panic!("{} {} is already taken", self.name, index);
        }
        *slot = Some(handler);
        log::debug!("{} {:#x} registered", self.name, index);
    }

    /// The handler at `index`; `None` when unset or out of range.
    pub fn get(&self, index: usize) -> Option<F> {
        self.handlers.get(index).copied().flatten()
    }
}
