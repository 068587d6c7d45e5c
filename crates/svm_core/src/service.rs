//! Client interface of the privileged register service.
//!
//! The translation registers and the cache/TLB maintenance instructions are
//! only reachable at supervisor level. A kernel-resident driver exposes them
//! through a pseudo-file; this module defines what the rest of the bridge
//! needs from that file, independent of how the bytes travel.

use crate::SvmError;
use log::{debug, error};
use svm_common::Address;
use svm_common::protocol::{Command, RegisterSnapshot};

/// Access to the privileged register service.
///
/// `snapshot` corresponds to one read of the pseudo-file and `command` to one
/// write. Implementations report an unreachable driver as
/// `SvmError::ServiceUnavailable`.
pub trait RegisterService {
    /// Reads translation control, translation base and the diagnostic value.
    fn snapshot(&mut self) -> Result<RegisterSnapshot, SvmError>;

    /// Issues a maintenance command with its register-width payload.
    fn command(&mut self, command: Command, payload: Address) -> Result<(), SvmError>;
}

impl<T: RegisterService + ?Sized> RegisterService for &mut T {
    fn snapshot(&mut self) -> Result<RegisterSnapshot, SvmError> {
        (**self).snapshot()
    }

    fn command(&mut self, command: Command, payload: Address) -> Result<(), SvmError> {
        (**self).command(command, payload)
    }
}

/// Captures the translation base, returning 0 when the service is missing.
///
/// This is the sentinel form used by callers that only need to know whether
/// the pointer-linked path is available: a zero base means SVM is disabled
/// and the flat encoding must be used.
///
/// # Arguments
///
/// * `service` - Register service to read from
///
/// # Returns
///
/// The TTBR0 value, or 0 if the service could not be read.
pub fn translation_base<S: RegisterService + ?Sized>(service: &mut S) -> Address {
    match service.snapshot() {
        Ok(snapshot) => {
            debug!(
                "TTBCR={:#010x}, TTBR0={:#010x}, diagnostic={:#010x}",
                snapshot.ttbcr, snapshot.ttbr0, snapshot.diagnostic
            );
            snapshot.ttbr0
        }
        Err(e) => {
            error!("cannot capture translation base: {e}");
            0
        }
    }
}
