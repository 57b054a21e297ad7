//! Contract guard - startup agreement between bindings and library
//!
//! The bindings carry the contract version they were generated for and one
//! `u16` checksum per exposed operation and callback method. At startup each
//! is compared against the value the loaded library exports. Any mismatch
//! means the two sides disagree on a signature, and nothing may be called.

use crate::error::ContractError;
use crate::ffi::native::NativeRuntime;
use crate::ffi::shape::OperationSignature;
use isthmus_config::ContractConfig;

/// One expected checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub symbol: String,
    pub expected: u16,
}

/// Everything the bindings expect from the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceContract {
    namespace: String,
    version: u32,
    checksums: Vec<ChecksumEntry>,
}

/// Outcome of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractReport {
    pub namespace: String,
    pub version: u32,
    pub verified: Vec<ChecksumEntry>,
}

impl InterfaceContract {
    pub fn new(namespace: impl Into<String>, version: u32) -> Self {
        Self {
            namespace: namespace.into(),
            version,
            checksums: Vec::new(),
        }
    }

    /// Build from the `[contract]` table of a project config.
    ///
    /// Checksums are checked in symbol order.
    pub fn from_config(namespace: impl Into<String>, config: &ContractConfig) -> Self {
        let mut contract = Self::new(namespace, config.version);
        for (symbol, expected) in &config.checksums {
            contract = contract.checksum(symbol.clone(), *expected);
        }
        contract
    }

    /// Expect `symbol` to export `expected`.
    pub fn checksum(mut self, symbol: impl Into<String>, expected: u16) -> Self {
        self.checksums.push(ChecksumEntry {
            symbol: symbol.into(),
            expected,
        });
        self
    }

    /// Expect `symbol` to export the checksum of `signature`.
    pub fn operation(self, symbol: impl Into<String>, signature: &OperationSignature) -> Self {
        let expected = signature.checksum();
        self.checksum(symbol, expected)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn checksums(&self) -> &[ChecksumEntry] {
        &self.checksums
    }

    /// Compare the contract against the library. Stops at the first mismatch.
    pub fn verify(&self, native: &dyn NativeRuntime) -> Result<ContractReport, ContractError> {
        let found = native.contract_version();
        if found != self.version {
            return Err(ContractError::VersionMismatch {
                namespace: self.namespace.clone(),
                expected: self.version,
                found,
            });
        }

        for entry in &self.checksums {
            let found = native
                .checksum(&entry.symbol)
                .ok_or_else(|| ContractError::MissingChecksum {
                    namespace: self.namespace.clone(),
                    symbol: entry.symbol.clone(),
                })?;
            if found != entry.expected {
                return Err(ContractError::ChecksumMismatch {
                    namespace: self.namespace.clone(),
                    symbol: entry.symbol.clone(),
                    expected: entry.expected,
                    found,
                });
            }
            tracing::trace!(symbol = %entry.symbol, checksum = found, "checksum verified");
        }

        tracing::debug!(
            namespace = %self.namespace,
            version = self.version,
            checksums = self.checksums.len(),
            "interface contract verified"
        );
        Ok(ContractReport {
            namespace: self.namespace.clone(),
            version: self.version,
            verified: self.checksums.clone(),
        })
    }
}
