//! Observing a running program.
//!
//! The [Vm](crate::vm::Vm) reports every executed instruction, every piece of
//! `printf` output and the way the program ended as an [Event]. Listeners are
//! attached with [Vm::add_listener](crate::vm::Vm::add_listener); any `Fn(&Event)`
//! closure is a listener. Nothing is dispatched while no listener is attached.

use std::fmt;

use crate::error::RuntimeError;
use crate::instruction::Instruction;

/// Something observable that happened while executing a program.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An instruction is about to be executed.
    Step {
        /// Index of the instruction.
        pc: usize,

        instruction: Instruction,
    },

    /// The program printed text.
    Output { text: String },

    /// The program terminated normally.
    Exit { code: i64 },

    /// Execution was aborted.
    Fault { error: RuntimeError },
}

/// Receives the events of a [Vm](crate::vm::Vm).
pub trait EventListener {
    /// Called once per event, in execution order.
    fn event(&mut self, event: &Event);
}

impl<F> EventListener for F
where
    F: Fn(&Event),
{
    fn event(&mut self, event: &Event) {
        self(event)
    }
}

#[derive(Default)]
pub(crate) struct EventDispatcher {
    listeners: Vec<Box<dyn EventListener>>,
}

impl EventDispatcher {
    pub fn new() -> EventDispatcher {
        EventDispatcher {
            listeners: Vec::new(),
        }
    }

    pub fn add_listener<L: EventListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn dispatch(&mut self, event: Event) {
        self.listeners
            .iter_mut()
            .for_each(|listener| listener.event(&event));
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
