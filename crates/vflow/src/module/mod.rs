// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Module runtime: control dispatch loop, ports and parameters.
//!
//! A module consumes its control channel one message at a time:
//!
//! ```text
//!        Compute                      compute() done
//!   Idle ---------> Busy (emit Busy) ----------------> Idle (emit Idle)
//!    |
//!    | Quit / Kill(own id) / compute() == false
//!    v
//!   Terminated (emit ModuleExit)
//! ```
//!
//! Objects arrive on input ports through `AddObject` messages. By the time one
//! is observed, the Data Manager has already made the object local, so the
//! loop only adopts the reference carried by the message.

mod params;

pub use params::Parameters;

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::config::NodeConfig;
use crate::control::ControlEndpoint;
use crate::error::{Error, Result};
use crate::message::{AddObject, ControlBody, ControlMessage, ParamValue};
use crate::store::{Handle, ObjectStore};

/// Dispatch loop state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModuleState {
    #[default]
    Idle,
    Busy,
    Terminated,
}

/// Computation hook invoked for every `Compute` message.
pub trait ComputeModule {
    /// Run one computation. Returning `false` shuts the module down.
    fn compute(&mut self, module: &mut Module) -> bool;
}

impl<F> ComputeModule for F
where
    F: FnMut(&mut Module) -> bool,
{
    fn compute(&mut self, module: &mut Module) -> bool {
        self(module)
    }
}

/// One pipeline module instance on one rank.
pub struct Module {
    name: String,
    id: i32,
    hub: i32,
    rank: i32,
    size: i32,
    endpoint: ControlEndpoint,
    store: ObjectStore,
    inputs: HashMap<String, VecDeque<Handle>>,
    outputs: BTreeSet<String>,
    params: Parameters,
    state: ModuleState,
    execution_count: i32,
}

impl Module {
    pub fn new(
        name: &str,
        id: i32,
        node: &NodeConfig,
        endpoint: ControlEndpoint,
        store: ObjectStore,
    ) -> Self {
        Self {
            name: name.to_owned(),
            id,
            hub: node.hub,
            rank: node.rank,
            size: node.size,
            endpoint,
            store,
            inputs: HashMap::new(),
            outputs: BTreeSet::new(),
            params: Parameters::new(),
            state: ModuleState::Idle,
            execution_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn hub(&self) -> i32 {
        self.hub
    }

    pub fn rank(&self) -> i32 {
        self.rank
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Execution counter of the current (or last) `Compute`.
    pub fn execution_count(&self) -> i32 {
        self.execution_count
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn send(&self, body: ControlBody) -> Result<()> {
        self.endpoint
            .send(&ControlMessage::new(self.id, self.rank, body))
    }

    // ========================================================================
    // Dispatch loop
    // ========================================================================

    /// Run until `Quit`, a matching `Kill`, or a computation returns `false`,
    /// then announce `ModuleExit`.
    ///
    /// Undecodable messages are logged and skipped; only a closed control
    /// channel ends the loop with an error.
    pub fn run(&mut self, compute: &mut dyn ComputeModule) -> Result<()> {
        loop {
            match self.dispatch_one(compute) {
                Ok(true) => {}
                Ok(false) => break,
                Err(Error::ChannelClosed) => {
                    log::error!("[module {} {}] control channel closed", self.name, self.id);
                    self.state = ModuleState::Terminated;
                    return Err(Error::ChannelClosed);
                }
                Err(e) => {
                    log::warn!("[module {} {}] dropped control message: {}", self.name, self.id, e);
                }
            }
        }
        self.state = ModuleState::Terminated;
        log::info!("[module {} {}] exiting", self.name, self.id);
        self.send(ControlBody::ModuleExit)
    }

    /// Block for one control message and handle it.
    ///
    /// Returns `Ok(false)` once the module should terminate.
    pub fn dispatch_one(&mut self, compute: &mut dyn ComputeModule) -> Result<bool> {
        let msg = self.endpoint.recv()?;
        self.handle_message(msg, compute)
    }

    pub fn handle_message(
        &mut self,
        msg: ControlMessage,
        compute: &mut dyn ComputeModule,
    ) -> Result<bool> {
        match msg.body {
            ControlBody::Ping { ch } => {
                self.send(ControlBody::Pong {
                    ch,
                    module: self.id,
                })?;
                Ok(true)
            }
            ControlBody::Pong { ch, module } => {
                log::debug!(
                    "[module {} {}] pong '{}' from {}",
                    self.name,
                    self.id,
                    char::from(ch),
                    module
                );
                Ok(true)
            }
            ControlBody::Quit => {
                log::info!("[module {} {}] quit requested by {}", self.name, self.id, msg.sender_id);
                Ok(false)
            }
            ControlBody::Kill { module } if module == self.id => {
                log::info!("[module {} {}] killed", self.name, self.id);
                Ok(false)
            }
            ControlBody::Kill { module } => {
                log::warn!("[module {} {}] ignoring kill for module {}", self.name, self.id, module);
                Ok(true)
            }
            ControlBody::Compute {
                execution_count, ..
            } => self.compute(execution_count, compute),
            ControlBody::AddObject { add, handle } => {
                self.receive_object(&add, handle);
                Ok(true)
            }
            ControlBody::SetParameter {
                module,
                name,
                value,
            } => {
                if module != self.id && module != -1 {
                    log::warn!(
                        "[module {} {}] parameter {} addressed to module {}",
                        self.name,
                        self.id,
                        name,
                        module
                    );
                } else if let Err(e) = self.params.set(&name, value) {
                    log::warn!("[module {} {}] cannot set {}: {}", self.name, self.id, name, e);
                }
                Ok(true)
            }
            ControlBody::Unknown { kind } => {
                log::warn!("[module {} {}] ignoring unknown message kind {}", self.name, self.id, kind);
                Ok(true)
            }
            other => {
                log::debug!("[module {} {}] ignoring {:?}", self.name, self.id, other);
                Ok(true)
            }
        }
    }

    fn compute(&mut self, execution_count: i32, compute: &mut dyn ComputeModule) -> Result<bool> {
        self.execution_count = execution_count;
        self.state = ModuleState::Busy;
        self.send(ControlBody::Busy)?;
        let keep_running = compute.compute(self);
        self.state = ModuleState::Idle;
        self.send(ControlBody::Idle)?;
        if !keep_running {
            log::info!("[module {} {}] compute requested shutdown", self.name, self.id);
        }
        Ok(keep_running)
    }

    fn receive_object(&mut self, add: &AddObject, raw: crate::store::RawRef) {
        let handle = match self.store.adopt(raw) {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!(
                    "[module {} {}] cannot adopt {}: {}",
                    self.name,
                    self.id,
                    add.object_name,
                    e
                );
                return;
            }
        };
        if let Err(e) = self.add_input_object(&add.dest_port, handle) {
            log::warn!("[module {} {}] dropped {}: {}", self.name, self.id, add.object_name, e);
        }
    }

    // ========================================================================
    // Ports
    // ========================================================================

    pub fn create_input_port(&mut self, name: &str) -> Result<()> {
        if self.inputs.contains_key(name) {
            return Err(Error::AlreadyExists(name.to_owned()));
        }
        self.send(ControlBody::CreateInputPort {
            name: name.to_owned(),
        })?;
        self.inputs.insert(name.to_owned(), VecDeque::new());
        Ok(())
    }

    pub fn create_output_port(&mut self, name: &str) -> Result<()> {
        if self.outputs.contains(name) {
            return Err(Error::AlreadyExists(name.to_owned()));
        }
        self.send(ControlBody::CreateOutputPort {
            name: name.to_owned(),
        })?;
        self.outputs.insert(name.to_owned());
        Ok(())
    }

    /// Hand `handle` to whatever is connected to output `port`.
    ///
    /// The handle's reference travels with the message; the module keeps none.
    pub fn add_object(&mut self, port: &str, handle: Handle) -> Result<()> {
        if !self.outputs.contains(port) {
            return Err(Error::UnknownPort(port.to_owned()));
        }
        let add = AddObject {
            sender_id: self.id,
            sender_hub: self.hub,
            sender_rank: self.rank,
            sender_port: port.to_owned(),
            object_name: handle.name().to_owned(),
            object_type: handle.object().map_or(0, |o| o.type_tag()),
            dest_id: -1,
            dest_rank: -1,
            dest_port: String::new(),
        };
        let raw = handle.into_raw();
        match self.send(ControlBody::AddObject { add, handle: raw }) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Not sent: take the reference back so it is released.
                drop(self.store.adopt(raw));
                Err(e)
            }
        }
    }

    /// Queue `handle` on input `port`.
    pub fn add_input_object(&mut self, port: &str, handle: Handle) -> Result<()> {
        match self.inputs.get_mut(port) {
            Some(queue) => {
                queue.push_back(handle);
                Ok(())
            }
            None => Err(Error::UnknownPort(port.to_owned())),
        }
    }

    /// Objects waiting on input `port`, oldest first.
    pub fn get_objects(&self, port: &str) -> Result<&VecDeque<Handle>> {
        self.inputs
            .get(port)
            .ok_or_else(|| Error::UnknownPort(port.to_owned()))
    }

    pub fn take_first_object(&mut self, port: &str) -> Result<Option<Handle>> {
        self.inputs
            .get_mut(port)
            .map(VecDeque::pop_front)
            .ok_or_else(|| Error::UnknownPort(port.to_owned()))
    }

    pub fn has_object(&self, port: &str) -> bool {
        self.inputs.get(port).is_some_and(|q| !q.is_empty())
    }

    /// Drop the queued object named `object` from input `port`.
    pub fn remove_object(&mut self, port: &str, object: &str) -> Result<bool> {
        let queue = self
            .inputs
            .get_mut(port)
            .ok_or_else(|| Error::UnknownPort(port.to_owned()))?;
        match queue.iter().position(|h| h.name() == object) {
            Some(at) => {
                queue.remove(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Declare a parameter and announce it to the coordinator.
    pub fn add_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        self.params.add(name, value.clone())?;
        self.send(ControlBody::AddParameter {
            name: name.to_owned(),
            value,
        })
    }

    /// Change a parameter locally and announce the new value.
    pub fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        self.params.set(name, value.clone())?;
        self.send(ControlBody::SetParameter {
            module: self.id,
            name: name.to_owned(),
            value,
        })
    }

    pub fn add_file_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        self.add_parameter(name, ParamValue::File(value.to_owned()))
    }

    pub fn add_float_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        self.add_parameter(name, ParamValue::Float(value))
    }

    pub fn add_int_parameter(&mut self, name: &str, value: i64) -> Result<()> {
        self.add_parameter(name, ParamValue::Int(value))
    }

    pub fn add_vector_parameter(&mut self, name: &str, value: [f64; 3]) -> Result<()> {
        self.add_parameter(name, ParamValue::Vector(value))
    }

    pub fn set_file_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        self.set_parameter(name, ParamValue::File(value.to_owned()))
    }

    pub fn set_float_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        self.set_parameter(name, ParamValue::Float(value))
    }

    pub fn set_int_parameter(&mut self, name: &str, value: i64) -> Result<()> {
        self.set_parameter(name, ParamValue::Int(value))
    }

    pub fn set_vector_parameter(&mut self, name: &str, value: [f64; 3]) -> Result<()> {
        self.set_parameter(name, ParamValue::Vector(value))
    }

    pub fn get_file_parameter(&self, name: &str) -> String {
        self.params.file(name)
    }

    pub fn get_float_parameter(&self, name: &str) -> f64 {
        self.params.float(name)
    }

    pub fn get_int_parameter(&self, name: &str) -> i64 {
        self.params.int(name)
    }

    pub fn get_vector_parameter(&self, name: &str) -> [f64; 3] {
        self.params.vector(name)
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("hub", &self.hub)
            .field("rank", &self.rank)
            .field("state", &self.state)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs)
            .finish()
    }
}
