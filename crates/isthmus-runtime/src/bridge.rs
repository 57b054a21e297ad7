//! Process-wide bridge startup
//!
//! Before any call crosses the boundary the bridge checks the interface
//! contract and installs every callback interface's vtable, in that order.
//! [`BridgeBuilder::start`] does this once per process and publishes the
//! result through [`Bridge::global`].

use crate::error::{ContractError, Fault};
use crate::ffi::callbacks::CallbackInterface;
use crate::ffi::contract::{ContractReport, InterfaceContract};
use crate::ffi::marshal::{self, Marshal};
use crate::ffi::native::NativeRuntime;
use crate::ffi::types::TransferBuffer;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

/// Startup failure. Not recoverable.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("interface contract check failed: {0}")]
    Contract(#[from] ContractError),

    #[error("callback installation for {interface} failed: {source}")]
    Callbacks {
        interface: &'static str,
        #[source]
        source: Fault,
    },

    #[error("bridge already started")]
    AlreadyStarted,
}

type Installer = fn(&Arc<dyn NativeRuntime>) -> Result<(), Fault>;

/// A started bridge: the native library plus what startup verified.
pub struct Bridge {
    native: Arc<dyn NativeRuntime>,
    report: ContractReport,
    interfaces: Vec<&'static str>,
}

impl Bridge {
    /// Start describing a bridge to `native`, checked against `contract`.
    pub fn builder(native: Arc<dyn NativeRuntime>, contract: InterfaceContract) -> BridgeBuilder {
        BridgeBuilder {
            native,
            contract,
            installers: Vec::new(),
        }
    }

    /// The bridge published by [`BridgeBuilder::start`], if any
    pub fn global() -> Option<&'static Bridge> {
        BRIDGE.get()
    }

    pub fn native(&self) -> &Arc<dyn NativeRuntime> {
        &self.native
    }

    /// What the startup contract check verified
    pub fn contract_report(&self) -> &ContractReport {
        &self.report
    }

    /// Callback interfaces installed at startup
    pub fn interfaces(&self) -> &[&'static str] {
        &self.interfaces
    }

    /// Encode a value into a native buffer for an argument.
    pub fn lower<T: Marshal>(&self, value: &T) -> Result<TransferBuffer, Fault> {
        marshal::lower(&*self.native, value)
    }

    /// Decode and release a buffer returned by the native side.
    ///
    /// # Safety
    ///
    /// See [`marshal::lift`].
    pub unsafe fn lift<T: Marshal>(&self, buffer: TransferBuffer) -> Result<T, Fault> {
        marshal::lift(&*self.native, buffer)
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("namespace", &self.native.namespace())
            .field("report", &self.report)
            .field("interfaces", &self.interfaces)
            .finish()
    }
}

/// Collects the callback interfaces for startup.
pub struct BridgeBuilder {
    native: Arc<dyn NativeRuntime>,
    contract: InterfaceContract,
    installers: Vec<(&'static str, Installer)>,
}

impl BridgeBuilder {

    /// Install `I`'s vtable during startup.
    pub fn callback_interface<I: CallbackInterface>(mut self) -> Self {
        self.installers.push((I::registry().interface(), I::install));
        self
    }

    /// Check the contract and install callbacks without publishing the
    /// bridge globally.
    pub fn build(self) -> Result<Bridge, StartupError> {
        let report = self.contract.verify(&*self.native)?;

        let mut interfaces = Vec::with_capacity(self.installers.len());
        for &(interface, install) in &self.installers {
            install(&self.native).map_err(|source| StartupError::Callbacks { interface, source })?;
            interfaces.push(interface);
        }

        tracing::info!(
            namespace = self.native.namespace(),
            callbacks = interfaces.len(),
            "bridge started"
        );
        Ok(Bridge {
            native: self.native,
            report,
            interfaces,
        })
    }

    /// Start the bridge and publish it through [`Bridge::global`].
    ///
    /// Fails with [`StartupError::AlreadyStarted`] on every call after the
    /// first successful one.
    pub fn start(self) -> Result<&'static Bridge, StartupError> {
        if BRIDGE.get().is_some() {
            return Err(StartupError::AlreadyStarted);
        }
        let bridge = self.build()?;
        BRIDGE.set(bridge).map_err(|_| StartupError::AlreadyStarted)?;
        BRIDGE.get().ok_or(StartupError::AlreadyStarted)
    }
}
