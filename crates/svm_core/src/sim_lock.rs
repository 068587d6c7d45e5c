//! Software model of the lock server.
//!
//! Each agent (host thread or simulated accelerator) talks to the server
//! through its own `ServerPort`. Writing the acquire request registers
//! interest; the token is granted to a requesting agent as soon as it is
//! free. Reading back the grant is what completes an acquire, as on the
//! hardware.

use core::sync::atomic::{AtomicU32, Ordering};
use svm_common::lock::{ACQUIRE_REQUEST, GRANTED, RELEASED};

use crate::lock::LockPort;

/// Number of agents a server can arbitrate between.
pub const MAX_AGENTS: u32 = 32;

const NO_OWNER: u32 = 0;

/// Arbitrates one token between up to `MAX_AGENTS` agents.
#[derive(Default)]
pub struct LockServer {
    /// 0 when free, otherwise the owning agent plus one.
    owner: AtomicU32,

    /// One pending-request bit per agent.
    requests: AtomicU32,
}

impl LockServer {
    pub const fn new() -> Self {
        Self {
            owner: AtomicU32::new(NO_OWNER),
            requests: AtomicU32::new(0),
        }
    }

    /// Returns the register pair of `agent`.
    ///
    /// # Panics
    ///
    /// If `agent` is not below `MAX_AGENTS`.
    pub fn port(&self, agent: u32) -> ServerPort<'_> {
        assert!(agent < MAX_AGENTS, "agent {agent} out of range");
        ServerPort {
            server: self,
            agent,
        }
    }

    /// Agent currently holding the token.
    pub fn owner(&self) -> Option<u32> {
        match self.owner.load(Ordering::Acquire) {
            NO_OWNER => None,
            id => Some(id - 1),
        }
    }

    fn try_grant(&self, agent: u32) -> bool {
        let id = agent + 1;
        match self
            .owner
            .compare_exchange(NO_OWNER, id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == id,
        }
    }
}

/// One agent's view of the lock server registers.
#[derive(Clone, Copy)]
pub struct ServerPort<'a> {
    server: &'a LockServer,
    agent: u32,
}

impl ServerPort<'_> {
    fn bit(&self) -> u32 {
        1 << self.agent
    }
}

impl LockPort for ServerPort<'_> {
    fn write(&self, value: u32) {
        let server = self.server;
        if value == ACQUIRE_REQUEST {
            server.requests.fetch_or(self.bit(), Ordering::AcqRel);
            server.try_grant(self.agent);
        } else {
            server.requests.fetch_and(!self.bit(), Ordering::AcqRel);
            let _ = server.owner.compare_exchange(
                self.agent + 1,
                NO_OWNER,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    fn read(&self) -> u32 {
        let server = self.server;
        if server.requests.load(Ordering::Acquire) & self.bit() == 0 {
            return RELEASED;
        }
        if server.try_grant(self.agent) {
            GRANTED
        } else {
            ACQUIRE_REQUEST
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_to_one_agent_at_a_time() {
        let server = LockServer::new();
        let a = server.port(0);
        let b = server.port(1);

        a.write(ACQUIRE_REQUEST);
        b.write(ACQUIRE_REQUEST);
        assert_eq!(a.read(), GRANTED);
        assert_eq!(b.read(), ACQUIRE_REQUEST);
        assert_eq!(server.owner(), Some(0));

        a.write(RELEASED);
        assert_eq!(a.read(), RELEASED);
        assert_eq!(b.read(), GRANTED);
        assert_eq!(server.owner(), Some(1));

        b.write(RELEASED);
        assert_eq!(server.owner(), None);
    }
}
