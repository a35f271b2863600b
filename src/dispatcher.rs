//! Menu loop that maps a typed selection to a registered operation.
//!
//! The registry is built once and never changes. Each pass of the loop
//! prints the menu, reads one line and runs at most one operation. Only the
//! quit token ends the loop; unknown selections are ignored without
//! feedback and an operation failure ends the loop with that failure.

use std::io::{self, BufRead, Write};

use log::{debug, error};
use thiserror::Error;

use crate::traits::{CameraError, Result};

/// Input that ends the loop.
pub const QUIT_TOKEN: &str = "q";

/// Errors that stop the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The selected operation failed; the failure is passed through untouched.
    #[error(transparent)]
    Operation(#[from] CameraError),
    /// A key was registered twice.
    #[error("Selection key '{0}' registered twice")]
    DuplicateKey(String),
    /// A key that no trimmed input could ever select, or the quit token itself.
    #[error("Selection key '{0}' is not usable")]
    InvalidKey(String),
    /// Input ended before the quit token.
    #[error("Input closed before the quit token was entered")]
    InputClosed,
    /// Reading the selection or writing the menu failed.
    #[error("Console I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A zero-argument capture or record action.
pub trait Operation {
    /// Run the action once.
    fn invoke(&self) -> Result<()>;
}

impl<F> Operation for F
where
    F: Fn() -> Result<()>,
{
    fn invoke(&self) -> Result<()> {
        self()
    }
}

struct Entry {
    key: String,
    description: String,
    operation: Box<dyn Operation>,
}

/// Immutable mapping from selection key to operation, in menu order.
pub struct OperationRegistry {
    entries: Vec<Entry>,
}

impl OperationRegistry {
    /// Start building a registry.
    #[must_use]
    pub const fn builder() -> RegistryBuilder {
        RegistryBuilder {
            entries: Vec::new(),
        }
    }

    /// Operation registered under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&dyn Operation> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.operation.as_ref())
    }

    /// Keys in menu order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the menu and the selection prompt.
    pub fn write_menu<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "\n")?;
        writeln!(out, "Please make a selection from below options:")?;
        for entry in &self.entries {
            writeln!(out, "{}. {}", entry.key, entry.description)?;
        }
        writeln!(out, "To quit, enter \"{QUIT_TOKEN}\"\n")?;
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => {
                writeln!(out, "Selection [{}-{}]:", first.key, last.key)?;
            }
            _ => writeln!(out, "Selection:")?,
        }
        out.flush()
    }
}

/// Collects entries for an [`OperationRegistry`].
pub struct RegistryBuilder {
    entries: Vec<Entry>,
}

impl RegistryBuilder {
    /// Add an operation under `key` with its menu description.
    pub fn register<F>(
        mut self,
        key: &str,
        description: &str,
        operation: F,
    ) -> std::result::Result<Self, DispatchError>
    where
        F: Fn() -> Result<()> + 'static,
    {
        if key.is_empty() || key.trim() != key || key == QUIT_TOKEN {
            return Err(DispatchError::InvalidKey(key.to_owned()));
        }
        if self.entries.iter().any(|entry| entry.key == key) {
            return Err(DispatchError::DuplicateKey(key.to_owned()));
        }
        self.entries.push(Entry {
            key: key.to_owned(),
            description: description.to_owned(),
            operation: Box::new(operation),
        });
        Ok(self)
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> OperationRegistry {
        OperationRegistry {
            entries: self.entries,
        }
    }
}

/// Where selections come from.
pub trait LineSource {
    /// Next line including its terminator, or `None` at end of input.
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Locks stdin per line, so operations can prompt on stdin between reads.
impl LineSource for io::Stdin {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        match self.read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }
}

/// Lines from any buffered reader.
pub struct ReaderLines<R>(pub R);

impl<R: BufRead> LineSource for ReaderLines<R> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        match self.0.read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }
}

/// Dispatcher states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Waiting for the next selection.
    AwaitingInput,
    /// The quit token was entered.
    Terminated,
}

/// The read-evaluate-invoke loop over a registry.
pub struct Dispatcher<'r, L, W> {
    registry: &'r OperationRegistry,
    input: L,
    output: W,
    state: DispatchState,
}

impl<'r, L: LineSource, W: Write> Dispatcher<'r, L, W> {
    /// Dispatcher in `AwaitingInput`.
    pub const fn new(registry: &'r OperationRegistry, input: L, output: W) -> Self {
        Self {
            registry,
            input,
            output,
            state: DispatchState::AwaitingInput,
        }
    }

    /// Current state.
    pub const fn state(&self) -> DispatchState {
        self.state
    }

    /// One pass: menu, read, then quit, invoke or ignore.
    ///
    /// Once terminated, further calls do no I/O.
    pub fn step(&mut self) -> std::result::Result<DispatchState, DispatchError> {
        if self.state == DispatchState::Terminated {
            return Ok(self.state);
        }

        self.registry.write_menu(&mut self.output)?;
        let line = self.input.next_line()?.ok_or(DispatchError::InputClosed)?;
        let selection = line.trim();

        if selection == QUIT_TOKEN {
            debug!("Quit selected");
            self.state = DispatchState::Terminated;
            return Ok(self.state);
        }

        match self.registry.get(selection) {
            Some(operation) => {
                debug!("Invoking operation {selection}");
                operation.invoke().map_err(|err| {
                    error!("Operation {selection} failed: {err}");
                    DispatchError::Operation(err)
                })?;
            }
            None => debug!("No operation registered for {selection:?}"),
        }
        Ok(self.state)
    }

    /// Loop until the quit token, or until an operation or the console fails.
    pub fn run(&mut self) -> std::result::Result<(), DispatchError> {
        while self.step()? == DispatchState::AwaitingInput {}
        Ok(())
    }

    /// Give back the output sink.
    pub fn into_output(self) -> W {
        self.output
    }
}
