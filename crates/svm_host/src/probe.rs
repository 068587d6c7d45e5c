//! Translation self-test on the board.
//!
//! Touches a scratch buffer page by page, walks each page through the
//! bridge and compares the result with what the kernel reports in the
//! pagemap.

use crate::HardwareArgs;
use anyhow::{Context, Result, ensure};
use svm_common::Address;
use svm_common::geometry::PAGE_SIZE;
use svm_core::SvmError;
use svm_core::phys::PhysicalMemory;
use svm_core::service::RegisterService;
use svm_core::translate::FrameLookup;
use svm_sys::SvmBridge;
use svm_sys::pagemap::Pagemap;

const PAGE_WORDS: usize = PAGE_SIZE as usize / 4;

pub fn probe(hw: &HardwareArgs, pages: usize) -> Result<()> {
    let mut bridge =
        SvmBridge::open(&hw.driver, &hw.devmem).context("Failed to open the SVM bridge")?;
    let snapshot = bridge.snapshot();
    println!(
        "TTBCR {:#010x}  TTBR0 {:#010x}  diagnostic {:#010x}",
        snapshot.ttbcr, snapshot.ttbr0, snapshot.diagnostic
    );
    println!(
        "SCU {}",
        if bridge.scu_enabled()? { "enabled" } else { "disabled" }
    );

    let mut pagemap = Pagemap::open_self().context("Failed to open the pagemap")?;
    // Distinct values so every page is faulted in.
    let buffer: Vec<u32> = (0..pages * PAGE_WORDS).map(|i| i as u32).collect();

    let vas = buffer
        .chunks(PAGE_WORDS)
        .map(|page| {
            Address::try_from(page.as_ptr() as usize)
                .context("probe needs a 32-bit address space")
        })
        .collect::<Result<Vec<_>>>()?;
    let mismatches = check_pages(&mut bridge, &mut pagemap, &vas)?;

    let flushed = bridge.flush_tlb()?;
    println!("TLB flush {}", if flushed { "confirmed" } else { "not confirmed" });
    ensure!(
        mismatches == 0,
        "{mismatches} of {pages} pages disagree with the pagemap"
    );
    Ok(())
}

/// Walks every address in `vas` and compares it with `lookup`.
///
/// A failed walk, including a physical window that cannot be mapped, aborts
/// the check. Addresses the lookup cannot resolve are reported and skipped.
///
/// # Returns
///
/// The number of addresses where the walk and the lookup disagree.
fn check_pages<M, S, L>(
    bridge: &mut SvmBridge<M, S>,
    lookup: &mut L,
    vas: &[Address],
) -> Result<usize>
where
    M: PhysicalMemory,
    S: RegisterService,
    L: FrameLookup,
{
    let mut mismatches = 0;
    for &va in vas {
        let walk = bridge
            .walk(va)
            .with_context(|| format!("Failed to walk {va:#010x}"))?;
        println!(
            "{va:#010x}: L1 {:#010x} @ {:#010x}, L2 {} -> {:#010x}",
            walk.l1.0,
            walk.l1_address,
            walk.l2
                .zip(walk.l2_address)
                .map(|(d, at)| format!("{:#010x} @ {at:#010x}", d.0))
                .unwrap_or_else(|| "-".to_string()),
            walk.physical
        );
        match bridge.cross_check(lookup, va) {
            Ok(_) => {}
            Err(e @ SvmError::TranslationMismatch { .. }) => {
                mismatches += 1;
                println!("  {e}");
            }
            Err(e @ (SvmError::TranslationFault { .. } | SvmError::Io)) => {
                println!("  pagemap check skipped: {e}");
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to check {va:#010x}")),
        }
    }
    Ok(mismatches)
}
