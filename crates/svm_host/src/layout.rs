use anyhow::{Context, Result};
use std::path::Path;
use svm_sys::pagemap::{Pagemap, memory_layout};

fn physical(pa: Option<u64>) -> String {
    pa.map(|pa| format!("{pa:#010x}"))
        .unwrap_or_else(|| "-".to_string())
}

/// Prints every mapping of the process with the physical address of its
/// first and last page.
pub fn print_layout(maps: &Path, pagemap: &Path) -> Result<()> {
    let mut lookup = Pagemap::open(pagemap)
        .with_context(|| format!("Failed to open {}", pagemap.display()))?;
    let regions = memory_layout(maps, &mut lookup)
        .with_context(|| format!("Failed to read {}", maps.display()))?;

    println!(
        "{:<33} {:<4} {:>7} {:>12} {:>12}  name",
        "range", "perm", "pages", "first pa", "last pa"
    );
    for r in &regions {
        println!(
            "{:#014x}-{:#014x}  {:<4} {:>7} {:>12} {:>12}  {}",
            r.start,
            r.end,
            r.perms,
            r.pages(),
            physical(r.first_pa),
            physical(r.last_pa),
            r.name
        );
    }
    Ok(())
}
