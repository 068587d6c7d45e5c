//! Common definitions shared by the SVM bridge, the privileged register
//! service and the host tools.
//!
//! This crate holds the physical memory map of the SoC peripherals the bridge
//! touches, the byte protocol spoken with the privileged register service,
//! the encoding of the hardware lock registers and the geometry of the
//! short-descriptor translation tables. Nothing in here performs any access;
//! it only fixes the numbers every other crate must agree on.

#![no_std]

/// Register-width address on the reference platform.
///
/// Both virtual and physical addresses are 32 bits wide. Physical addresses
/// are bus addresses that the accelerator can issue directly.
pub type Address = u32;

/// Number of bytes in one register-width value on the wire.
pub const REGISTER_BYTES: usize = core::mem::size_of::<Address>();

/// Physical address map of the peripherals used by the bridge.
///
/// These addresses must match the FPGA/HPS memory map of the board. The host
/// reaches every one of them through the raw physical memory window.
pub mod mmio {
    use crate::Address;

    /// Base of the lock server control/status registers in the FPGA fabric.
    ///
    /// The lock server arbitrates a single token between the host and the
    /// accelerator. It sits on the lightweight HPS-to-FPGA bridge.
    pub const LOCK_SERVER_CSR: Address = 0xFF20_0000;

    /// Offset of the lock write port (request / release).
    pub const LOCK_WRITE_OFFSET: Address = 0x00;

    /// Offset of the lock read port (current grant state).
    pub const LOCK_READ_OFFSET: Address = 0x10;

    /// Base of the AXI cache/security bridge that overrides the AxCACHE,
    /// AxPROT and AxUSER signals of accelerator-issued transactions.
    pub const AXI_CACHE_SECURITY_BRIDGE: Address = 0xFF20_0100;

    /// Bridge register offsets, write channel first.
    pub const BRIDGE_AWCACHE: Address = 0x00;
    pub const BRIDGE_AWPROT: Address = 0x04;
    pub const BRIDGE_AWUSER: Address = 0x08;
    pub const BRIDGE_ARCACHE: Address = 0x10;
    pub const BRIDGE_ARPROT: Address = 0x14;
    pub const BRIDGE_ARUSER: Address = 0x18;
    pub const BRIDGE_RESERVED: Address = 0x1C;

    /// AxCACHE value making transactions cacheable (write-back, allocate).
    pub const AXCACHE_COHERENT: u32 = 0xF;

    /// AxCACHE value for plain bufferable, non-cacheable transactions.
    pub const AXCACHE_BYPASS: u32 = 0x1;

    /// AxUSER value routing transactions through the coherency port.
    pub const AXUSER_COHERENT: u32 = 0x1;

    /// AxUSER value keeping transactions outside the coherency domain.
    pub const AXUSER_BYPASS: u32 = 0x0;

    /// AxPROT value (unprivileged, non-secure, data).
    pub const AXPROT_DEFAULT: u32 = 0x4;

    /// Snoop control unit base. Bit 0 of the control register at offset 0
    /// reports whether the SCU is enabled.
    pub const SCU_CONTROLLER: Address = 0xFFFE_C000;

    /// Enable bit of the SCU control register.
    pub const SCU_ENABLE: u32 = 0x1;

    /// Base of the L2 cache controller (PL310).
    pub const L2_CACHE_CONTROLLER: Address = 0xFFFE_F000;

    /// Clean line by physical address.
    pub const L2_CLEAN_PA: Address = 0x7B0;

    /// Invalidate line by physical address.
    pub const L2_INVALIDATE_PA: Address = 0x770;
}

/// Byte protocol of the privileged register service pseudo-file.
///
/// A read returns three little-endian register values back to back. A write
/// is one command byte optionally followed by a little-endian register-width
/// payload.
pub mod protocol {
    use crate::{Address, REGISTER_BYTES};

    /// Sysfs attribute exported by the kernel-resident driver.
    pub const DRIVER_PATH: &str = "/sys/bus/platform/drivers/svm_driver/svm_driver";

    /// Length of a full read: translation control, translation base, diagnostic.
    pub const SNAPSHOT_LEN: usize = 3 * REGISTER_BYTES;

    /// Length of a command carrying a payload.
    pub const COMMAND_LEN: usize = 1 + REGISTER_BYTES;

    /// Diagnostic value the driver leaves behind after a full TLB invalidate.
    pub const TLB_FLUSH_MARKER: Address = 0x12;

    /// Commands understood by the register service.
    #[repr(u8)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Command {
        /// Set the SMP bit of the auxiliary control register and the
        /// matching non-secure access bit, joining the coherency domain.
        EnableCoherency = 0x01,

        /// Clean and invalidate the data cache line holding the payload
        /// address. Known to destabilise the reference board; the primary
        /// workflow keeps coherency through the ACP instead.
        CleanInvalidateLine = 0x02,

        /// Invalidate the unified, data and instruction TLBs. The payload
        /// is ignored.
        InvalidateTlb = 0x03,
    }

    impl Command {
        /// Maps a raw command byte back to a command.
        pub fn from_byte(byte: u8) -> Option<Self> {
            match byte {
                0x01 => Some(Self::EnableCoherency),
                0x02 => Some(Self::CleanInvalidateLine),
                0x03 => Some(Self::InvalidateTlb),
                _ => None,
            }
        }

        /// Whether the command is sent with a register-width payload.
        pub fn has_payload(self) -> bool {
            !matches!(self, Self::EnableCoherency)
        }

        /// Encodes the command and its payload as written to the pseudo-file.
        ///
        /// Returns the buffer and the number of meaningful bytes in it.
        pub fn encode(self, payload: Address) -> ([u8; COMMAND_LEN], usize) {
            let mut buf = [0u8; COMMAND_LEN];
            buf[0] = self as u8;
            if self.has_payload() {
                buf[1..].copy_from_slice(&payload.to_le_bytes());
                (buf, COMMAND_LEN)
            } else {
                (buf, 1)
            }
        }
    }

    /// Reads the little-endian payload following a command byte, if present.
    pub fn decode_payload(buf: &[u8]) -> Option<Address> {
        let bytes: [u8; REGISTER_BYTES] = buf.get(1..COMMAND_LEN)?.try_into().ok()?;
        Some(Address::from_le_bytes(bytes))
    }

    /// One read of the register service.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RegisterSnapshot {
        /// Translation table base control register.
        pub ttbcr: Address,
        /// Translation table base register 0.
        pub ttbr0: Address,
        /// Driver-internal diagnostic value.
        pub diagnostic: Address,
    }

    impl RegisterSnapshot {
        pub fn to_bytes(&self) -> [u8; SNAPSHOT_LEN] {
            let mut buf = [0u8; SNAPSHOT_LEN];
            buf[0..4].copy_from_slice(&self.ttbcr.to_le_bytes());
            buf[4..8].copy_from_slice(&self.ttbr0.to_le_bytes());
            buf[8..12].copy_from_slice(&self.diagnostic.to_le_bytes());
            buf
        }

        /// Decodes a snapshot; `None` on a short read.
        pub fn from_bytes(buf: &[u8]) -> Option<Self> {
            if buf.len() < SNAPSHOT_LEN {
                return None;
            }
            let word = |i: usize| {
                Address::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]])
            };
            Some(Self {
                ttbcr: word(0),
                ttbr0: word(4),
                diagnostic: word(8),
            })
        }
    }
}

/// Values exchanged with the lock server through its register pair.
pub mod lock {
    /// Written to release the token, and the idle state after init.
    pub const RELEASED: u32 = 0;

    /// Written to request the token.
    pub const ACQUIRE_REQUEST: u32 = 1;

    /// Read back while the requesting side holds the token.
    pub const GRANTED: u32 = 2;
}

/// Geometry of the ARMv7 short-descriptor translation tables.
///
/// A virtual address splits into a 12-bit level-1 index, an 8-bit level-2
/// index and a 12-bit page offset. Level-1 entries cover 1 MiB, level-2
/// entries 4 KiB.
pub mod geometry {
    use crate::Address;

    pub const L1_SHIFT: u32 = 20;
    pub const L1_INDEX_BITS: u32 = 12;
    pub const L2_SHIFT: u32 = 12;
    pub const L2_INDEX_BITS: u32 = 8;

    pub const PAGE_SIZE: Address = 1 << L2_SHIFT;
    pub const PAGE_OFFSET_MASK: Address = PAGE_SIZE - 1;
    pub const SECTION_SIZE: Address = 1 << L1_SHIFT;
    pub const LARGE_PAGE_SIZE: Address = 1 << 16;

    /// Level-1 tables are 16 KiB aligned when TTBCR.N is zero.
    pub const L1_TABLE_ALIGN_SHIFT: u32 = 14;

    /// Level-2 tables are 1 KiB aligned.
    pub const L2_TABLE_ALIGN_SHIFT: u32 = 10;

    /// Size of one descriptor in bytes.
    pub const DESCRIPTOR_BYTES: Address = 4;

    /// Data cache line size of both cache levels.
    pub const CACHE_LINE: Address = 32;

    /// Rounds an address down to the start of its cache line.
    pub const fn line_align(addr: Address) -> Address {
        addr & !(CACHE_LINE - 1)
    }
}
